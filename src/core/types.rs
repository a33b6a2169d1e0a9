use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque compare-and-swap version stamp. Zero means "no CAS check".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cas(u64);

impl Cas {
    pub const NONE: Cas = Cas(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Cas {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Server-side replication/persistence requirement for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurabilityLevel {
    None,
    Majority,
    MajorityAndPersistToActive,
    PersistToMajority,
}

impl DurabilityLevel {
    /// Wire byte, or `None` when the level is not sent at all.
    pub fn code(&self) -> Option<u8> {
        match self {
            DurabilityLevel::None => None,
            DurabilityLevel::Majority => Some(0x01),
            DurabilityLevel::MajorityAndPersistToActive => Some(0x02),
            DurabilityLevel::PersistToMajority => Some(0x03),
        }
    }

    /// Levels that block on persistence and need the durable timeout budget.
    pub fn requires_persistence(&self) -> bool {
        matches!(
            self,
            DurabilityLevel::MajorityAndPersistToActive | DurabilityLevel::PersistToMajority
        )
    }
}

/// Legacy observe-based persistence requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistTo {
    #[default]
    None,
    Active,
    One,
    Two,
    Three,
    Four,
}

/// Legacy observe-based replication requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicateTo {
    #[default]
    None,
    One,
    Two,
    Three,
}

/// Durability requirement of a write: either the server-side level or the
/// legacy client-polling counts, never both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Durability {
    #[default]
    None,
    Level(DurabilityLevel),
    Observe {
        persist_to: PersistTo,
        replicate_to: ReplicateTo,
    },
}

impl Durability {
    /// The level to put on the wire. `DurabilityLevel::None` collapses to unset.
    pub fn level(&self) -> Option<DurabilityLevel> {
        match self {
            Durability::Level(level) if level.code().is_some() => Some(*level),
            _ => None,
        }
    }

    pub fn persist_to(&self) -> PersistTo {
        match self {
            Durability::Observe { persist_to, .. } => *persist_to,
            _ => PersistTo::None,
        }
    }

    pub fn replicate_to(&self) -> ReplicateTo {
        match self {
            Durability::Observe { replicate_to, .. } => *replicate_to,
            _ => ReplicateTo::None,
        }
    }
}

/// Existence semantics of a subdocument mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreSemantics {
    Insert,
    Upsert,
    #[default]
    Replace,
}

/// Retry policy handed through to the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetryStrategy {
    #[default]
    BestEffort,
    FailFast,
}
