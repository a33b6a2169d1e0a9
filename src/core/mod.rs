pub mod error;
pub mod expiry;
pub mod identifier;
pub mod types;

pub use error::{ErrorContext, ErrorKind, KvError, Result};
pub use expiry::{Clock, EventSink, Expiry, ExpiryEvent, FixedClock, LogEventSink, SystemClock};
pub use identifier::{CollectionIdentifier, Identifier};
pub use types::{
    Cas, Durability, DurabilityLevel, PersistTo, ReplicateTo, RetryStrategy, StoreSemantics,
};
