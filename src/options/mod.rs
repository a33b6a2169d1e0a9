//! Per-operation option values.
//!
//! Options are plain immutable values assembled with consuming setters and
//! passed by value into the request builders. Every option type shares the
//! [`CommonOptions`] block; write options additionally carry a [`Durability`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::codec::{JsonSerializer, Transcoder};
use crate::core::{Cas, Durability, Expiry, RetryStrategy, StoreSemantics};
use crate::tracer::RequestSpan;

/// Opaque caller data travelling with a request, never sent to the server.
pub type ClientContext = BTreeMap<String, Value>;

#[derive(Clone, Default)]
pub struct CommonOptions {
    pub timeout: Option<Duration>,
    pub retry_strategy: Option<RetryStrategy>,
    pub parent_span: Option<RequestSpan>,
    pub client_context: Option<ClientContext>,
}

pub trait HasCommonOptions {
    fn common(&self) -> &CommonOptions;
}

pub trait DurabilityOptions: HasCommonOptions {
    fn durability_requirement(&self) -> Durability;
}

macro_rules! common_options {
    ($name:ident) => {
        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn timeout(mut self, timeout: Duration) -> Self {
                self.common.timeout = Some(timeout);
                self
            }

            pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
                self.common.retry_strategy = Some(strategy);
                self
            }

            pub fn parent_span(mut self, span: RequestSpan) -> Self {
                self.common.parent_span = Some(span);
                self
            }

            pub fn client_context(mut self, context: ClientContext) -> Self {
                self.common.client_context = Some(context);
                self
            }
        }

        impl HasCommonOptions for $name {
            fn common(&self) -> &CommonOptions {
                &self.common
            }
        }
    };
}

macro_rules! durability_options {
    ($name:ident) => {
        impl $name {
            pub fn durability(mut self, durability: Durability) -> Self {
                self.durability = durability;
                self
            }
        }

        impl DurabilityOptions for $name {
            fn durability_requirement(&self) -> Durability {
                self.durability
            }
        }
    };
}

macro_rules! transcoder_option {
    ($name:ident) => {
        impl $name {
            pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
                self.transcoder = Some(transcoder);
                self
            }
        }
    };
}

macro_rules! expiry_option {
    ($name:ident) => {
        impl $name {
            pub fn expiry(mut self, expiry: Expiry) -> Self {
                self.expiry = expiry;
                self
            }
        }
    };
}

#[derive(Clone, Default)]
pub struct GetOptions {
    pub common: CommonOptions,
    pub projections: Vec<String>,
    pub with_expiry: bool,
    pub transcoder: Option<Arc<dyn Transcoder>>,
}

common_options!(GetOptions);
transcoder_option!(GetOptions);

impl GetOptions {
    /// Fetch only these paths instead of the whole document.
    pub fn project<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projections.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Also fetch the document's expiry.
    pub fn with_expiry(mut self, with_expiry: bool) -> Self {
        self.with_expiry = with_expiry;
        self
    }

    /// True when the fetch has to go through a subdocument lookup.
    pub fn needs_subdoc(&self) -> bool {
        !self.projections.is_empty() || self.with_expiry
    }
}

#[derive(Clone, Default)]
pub struct GetAndLockOptions {
    pub common: CommonOptions,
    pub transcoder: Option<Arc<dyn Transcoder>>,
}

common_options!(GetAndLockOptions);
transcoder_option!(GetAndLockOptions);

#[derive(Clone, Default)]
pub struct GetAndTouchOptions {
    pub common: CommonOptions,
    pub transcoder: Option<Arc<dyn Transcoder>>,
}

common_options!(GetAndTouchOptions);
transcoder_option!(GetAndTouchOptions);

#[derive(Clone, Default)]
pub struct ExistsOptions {
    pub common: CommonOptions,
}

common_options!(ExistsOptions);

#[derive(Clone, Default)]
pub struct GetAnyReplicaOptions {
    pub common: CommonOptions,
    pub transcoder: Option<Arc<dyn Transcoder>>,
}

common_options!(GetAnyReplicaOptions);
transcoder_option!(GetAnyReplicaOptions);

#[derive(Clone, Default)]
pub struct GetAllReplicasOptions {
    pub common: CommonOptions,
    pub transcoder: Option<Arc<dyn Transcoder>>,
}

common_options!(GetAllReplicasOptions);
transcoder_option!(GetAllReplicasOptions);

#[derive(Clone, Default)]
pub struct InsertOptions {
    pub common: CommonOptions,
    pub durability: Durability,
    pub expiry: Expiry,
    pub transcoder: Option<Arc<dyn Transcoder>>,
}

common_options!(InsertOptions);
durability_options!(InsertOptions);
transcoder_option!(InsertOptions);
expiry_option!(InsertOptions);

#[derive(Clone, Default)]
pub struct UpsertOptions {
    pub common: CommonOptions,
    pub durability: Durability,
    pub expiry: Expiry,
    pub preserve_expiry: bool,
    pub transcoder: Option<Arc<dyn Transcoder>>,
}

common_options!(UpsertOptions);
durability_options!(UpsertOptions);
transcoder_option!(UpsertOptions);
expiry_option!(UpsertOptions);

impl UpsertOptions {
    /// Keep the existing document expiry instead of overwriting it.
    pub fn preserve_expiry(mut self, preserve: bool) -> Self {
        self.preserve_expiry = preserve;
        self
    }
}

#[derive(Clone, Default)]
pub struct ReplaceOptions {
    pub common: CommonOptions,
    pub durability: Durability,
    pub expiry: Expiry,
    pub preserve_expiry: bool,
    pub cas: Cas,
    pub transcoder: Option<Arc<dyn Transcoder>>,
}

common_options!(ReplaceOptions);
durability_options!(ReplaceOptions);
transcoder_option!(ReplaceOptions);
expiry_option!(ReplaceOptions);

impl ReplaceOptions {
    pub fn preserve_expiry(mut self, preserve: bool) -> Self {
        self.preserve_expiry = preserve;
        self
    }

    pub fn cas(mut self, cas: impl Into<Cas>) -> Self {
        self.cas = cas.into();
        self
    }
}

#[derive(Clone, Default)]
pub struct RemoveOptions {
    pub common: CommonOptions,
    pub durability: Durability,
    pub cas: Cas,
}

common_options!(RemoveOptions);
durability_options!(RemoveOptions);

impl RemoveOptions {
    pub fn cas(mut self, cas: impl Into<Cas>) -> Self {
        self.cas = cas.into();
        self
    }
}

#[derive(Clone, Default)]
pub struct TouchOptions {
    pub common: CommonOptions,
}

common_options!(TouchOptions);

#[derive(Clone, Default)]
pub struct UnlockOptions {
    pub common: CommonOptions,
}

common_options!(UnlockOptions);

#[derive(Clone, Default)]
pub struct LookupInOptions {
    pub common: CommonOptions,
    pub access_deleted: bool,
    pub serializer: Option<Arc<dyn JsonSerializer>>,
}

common_options!(LookupInOptions);

impl LookupInOptions {
    /// Allow the lookup to read a tombstoned document.
    pub fn access_deleted(mut self, access_deleted: bool) -> Self {
        self.access_deleted = access_deleted;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn JsonSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }
}

#[derive(Clone, Default)]
pub struct MutateInOptions {
    pub common: CommonOptions,
    pub durability: Durability,
    pub expiry: Expiry,
    pub preserve_expiry: bool,
    pub cas: Cas,
    pub store_semantics: StoreSemantics,
    pub access_deleted: bool,
    pub create_as_deleted: bool,
    pub serializer: Option<Arc<dyn JsonSerializer>>,
}

common_options!(MutateInOptions);
durability_options!(MutateInOptions);
expiry_option!(MutateInOptions);

impl MutateInOptions {
    pub fn preserve_expiry(mut self, preserve: bool) -> Self {
        self.preserve_expiry = preserve;
        self
    }

    pub fn cas(mut self, cas: impl Into<Cas>) -> Self {
        self.cas = cas.into();
        self
    }

    pub fn store_semantics(mut self, semantics: StoreSemantics) -> Self {
        self.store_semantics = semantics;
        self
    }

    pub fn access_deleted(mut self, access_deleted: bool) -> Self {
        self.access_deleted = access_deleted;
        self
    }

    /// Create the document directly as a tombstone. Requires bucket support.
    pub fn create_as_deleted(mut self, create_as_deleted: bool) -> Self {
        self.create_as_deleted = create_as_deleted;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn JsonSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }
}
