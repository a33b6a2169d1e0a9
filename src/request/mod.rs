//! Built key-value requests and their wire frame.
//!
//! A [`KvRequest`] is immutable once a builder returns it. The correlation
//! span and the measured encode latency travel with the request but never
//! reach the frame, so two builds from identical inputs encode to identical
//! bytes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Cas, DurabilityLevel, Identifier, KvError, Result, RetryStrategy};
use crate::options::ClientContext;
use crate::subdoc::{SubdocGetCommand, SubdocMutateCommand};
use crate::tracer::RequestSpan;

/// Which copy of a document a read addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaTarget {
    Active,
    Replica(u16),
}

impl std::fmt::Display for ReplicaTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicaTarget::Active => write!(f, "active"),
            ReplicaTarget::Replica(index) => write!(f, "replica#{}", index),
        }
    }
}

/// Per-request data that stays on the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub client_context: Option<ClientContext>,
    /// Time spent encoding the document or subdocument fragments.
    pub encode_latency: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOp {
    Get,
    GetAndLock {
        lock_time_secs: u32,
    },
    GetAndTouch {
        expiry: u32,
    },
    GetMeta,
    Insert {
        content: Vec<u8>,
        flags: u32,
        expiry: u32,
        durability: Option<DurabilityLevel>,
    },
    Upsert {
        content: Vec<u8>,
        flags: u32,
        expiry: u32,
        preserve_expiry: bool,
        durability: Option<DurabilityLevel>,
    },
    Replace {
        content: Vec<u8>,
        flags: u32,
        expiry: u32,
        preserve_expiry: bool,
        cas: Cas,
        durability: Option<DurabilityLevel>,
    },
    Remove {
        cas: Cas,
        durability: Option<DurabilityLevel>,
    },
    Touch {
        expiry: u32,
    },
    Unlock {
        cas: Cas,
    },
    SubdocGet {
        doc_flags: u8,
        commands: Vec<SubdocGetCommand>,
    },
    SubdocMutate {
        doc_flags: u8,
        commands: Vec<SubdocMutateCommand>,
        expiry: u32,
        preserve_expiry: bool,
        cas: Cas,
        durability: Option<DurabilityLevel>,
    },
    ReplicaGet {
        target: ReplicaTarget,
    },
}

impl KvOp {
    pub fn durability(&self) -> Option<DurabilityLevel> {
        match self {
            KvOp::Insert { durability, .. }
            | KvOp::Upsert { durability, .. }
            | KvOp::Replace { durability, .. }
            | KvOp::Remove { durability, .. }
            | KvOp::SubdocMutate { durability, .. } => *durability,
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KvRequest {
    pub identifier: Identifier,
    pub timeout: Duration,
    pub retry_strategy: RetryStrategy,
    pub span: RequestSpan,
    pub context: RequestContext,
    pub op: KvOp,
}

impl KvRequest {
    pub fn name(&self) -> &'static str {
        self.span.name()
    }

    pub fn frame(&self) -> WireFrame {
        WireFrame {
            bucket: self.identifier.bucket().to_string(),
            scope: self.identifier.scope().to_string(),
            collection: self.identifier.collection().to_string(),
            key: self.identifier.key().to_string(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            retry: self.retry_strategy,
            op: self.op.clone(),
        }
    }

    /// MessagePack encoding of [`KvRequest::frame`].
    pub fn encode_wire(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(&self.frame()).map_err(|err| KvError::encoding(err, &self.identifier))
    }
}

/// Everything the server sees of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFrame {
    pub bucket: String,
    pub scope: String,
    pub collection: String,
    pub key: String,
    pub timeout_ms: u64,
    pub retry: RetryStrategy,
    pub op: KvOp,
}

impl WireFrame {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|err| KvError::Decoding(err.to_string()))
    }
}
