//! Everything needed to build and run document operations.
//!
//! `use docwire::prelude::*;` brings in the collection, its option types and
//! the value types they take.

pub use crate::codec::Content;
pub use crate::collection::Collection;
pub use crate::core::{
    Cas, CollectionIdentifier, Durability, DurabilityLevel, Expiry, Identifier, KvError,
    PersistTo, ReplicateTo, Result, RetryStrategy, StoreSemantics,
};
pub use crate::dispatch::{BucketCapability, BucketConfig, InMemoryDispatcher, StaticTopology};
pub use crate::env::{ClientEnvironment, config::TimeoutConfig};
pub use crate::options::*;
pub use crate::replica::AttemptState;
pub use crate::request::ReplicaTarget;
pub use crate::subdoc::{LookupInSpec, MutateInMacro, MutateInSpec};
