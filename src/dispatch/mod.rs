//! Seams to the transport and to cluster metadata.

pub mod in_memory;

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::{KvError, Result};
use crate::request::KvRequest;
use crate::result::KvResponse;

pub use in_memory::InMemoryDispatcher;

/// Hands built requests to the network.
///
/// Implementations own retries, node selection and timeout enforcement; the
/// request builders never start timers themselves.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: KvRequest) -> Result<KvResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketCapability {
    CreateAsDeleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    pub name: String,
    pub num_replicas: u16,
    pub capabilities: BTreeSet<BucketCapability>,
}

impl BucketConfig {
    pub fn new(name: impl Into<String>, num_replicas: u16) -> Self {
        Self {
            name: name.into(),
            num_replicas,
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capability(mut self, capability: BucketCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn supports(&self, capability: BucketCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Bucket metadata a mutation waited for, if it needed any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyMetadata {
    NotRequired,
    Loaded(BucketConfig),
}

#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Resolves once the bucket's configuration is known, or fails after `timeout`.
    async fn bucket_config(&self, bucket: &str, timeout: Duration) -> Result<BucketConfig>;
}

/// Topology source over a fixed set of bucket configurations.
#[derive(Debug, Default)]
pub struct StaticTopology {
    buckets: RwLock<HashMap<String, BucketConfig>>,
}

impl StaticTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(config: BucketConfig) -> Self {
        let mut buckets = HashMap::new();
        buckets.insert(config.name.clone(), config);
        Self {
            buckets: RwLock::new(buckets),
        }
    }

    pub async fn insert(&self, config: BucketConfig) {
        self.buckets.write().await.insert(config.name.clone(), config);
    }
}

#[async_trait]
impl TopologySource for StaticTopology {
    async fn bucket_config(&self, bucket: &str, _timeout: Duration) -> Result<BucketConfig> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .cloned()
            .ok_or_else(|| {
                KvError::TopologyUnavailable(format!("bucket '{}' has no configuration", bucket))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_topology_serves_known_buckets() {
        let topology = StaticTopology::with_bucket(
            BucketConfig::new("travel", 2).with_capability(BucketCapability::CreateAsDeleted),
        );
        let config = topology
            .bucket_config("travel", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(config.num_replicas, 2);
        assert!(config.supports(BucketCapability::CreateAsDeleted));

        let err = topology
            .bucket_config("missing", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::TopologyUnavailable(_)));
    }
}
