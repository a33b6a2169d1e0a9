// ============================================================================
// docwire: request construction for a distributed document database
// ============================================================================

pub mod codec;
pub mod collection;
pub mod core;
pub mod dispatch;
pub mod durability;
pub mod env;
pub mod options;
pub mod prelude;
pub mod replica;
pub mod request;
pub mod result;
pub mod subdoc;
pub mod tracer;

// Re-export main types for convenience
pub use crate::core::{
    Cas, CollectionIdentifier, Durability, DurabilityLevel, ErrorKind, Expiry, Identifier,
    KvError, PersistTo, ReplicateTo, Result, RetryStrategy, StoreSemantics,
};
pub use codec::{Content, JsonSerializer, Transcoder};
pub use collection::{Collection, PreparedMutateIn};
pub use dispatch::{
    BucketCapability, BucketConfig, Dispatcher, InMemoryDispatcher, StaticTopology,
    TopologyMetadata, TopologySource,
};
pub use durability::{decide_kv_timeout, resolve_timeout};
pub use env::{ClientEnvironment, config::TimeoutConfig};
pub use replica::{AttemptState, ReplicaAttempt, ReplicaOutcome};
pub use request::{KvOp, KvRequest, ReplicaTarget, WireFrame};
pub use result::{
    ExistsResult, GetReplicaResult, GetResult, LookupInResult, MutateInResult, MutationResult,
};
pub use subdoc::{LookupInSpec, MutateInMacro, MutateInSpec};
