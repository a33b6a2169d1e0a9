use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SCOPE: &str = "_default";
pub const DEFAULT_COLLECTION: &str = "_default";

/// The (bucket, scope, collection) prefix shared by every document of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionIdentifier {
    bucket: String,
    scope: String,
    collection: String,
}

impl CollectionIdentifier {
    pub fn new(
        bucket: impl Into<String>,
        scope: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            scope: scope.into(),
            collection: collection.into(),
        }
    }

    /// Identifier for the default scope and collection of a bucket.
    pub fn default_for(bucket: impl Into<String>) -> Self {
        Self::new(bucket, DEFAULT_SCOPE, DEFAULT_COLLECTION)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_default(&self) -> bool {
        self.scope == DEFAULT_SCOPE && self.collection == DEFAULT_COLLECTION
    }

    /// Attaches a document key. The key is not validated here.
    pub fn document(&self, key: impl Into<String>) -> Identifier {
        Identifier {
            collection: self.clone(),
            key: key.into(),
        }
    }
}

/// Immutable address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    collection: CollectionIdentifier,
    key: String,
}

impl Identifier {
    pub fn new(
        bucket: impl Into<String>,
        scope: impl Into<String>,
        collection: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        CollectionIdentifier::new(bucket, scope, collection).document(key)
    }

    pub fn bucket(&self) -> &str {
        self.collection.bucket()
    }

    pub fn scope(&self) -> &str {
        self.collection.scope()
    }

    pub fn collection(&self) -> &str {
        self.collection.collection()
    }

    pub fn collection_identifier(&self) -> &CollectionIdentifier {
        &self.collection
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}::{}",
            self.bucket(),
            self.scope(),
            self.collection(),
            self.key
        )
    }
}
