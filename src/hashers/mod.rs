//! Map hashers, looked up by hash strategy
//!
//! Storage only needs a hasher's output size; the hash functions themselves
//! are used by callers that compute tile contents and roots.

mod coniks;
mod rfc6962;

use std::collections::HashMap;
use std::sync::Arc;

pub use coniks::ConiksHasher;
pub use rfc6962::TestMapHasher;

use crate::error::{MapStorageError, MapStorageResult};
use crate::tree::HashStrategy;

/// Hash functions of a sparse Merkle map
pub trait MapHasher: Send + Sync {
    /// Output size in bytes
    fn size(&self) -> usize;

    /// Hash of a leaf value at `index` of map `tree_id`
    fn hash_leaf(&self, tree_id: i64, index: &[u8], leaf: &[u8]) -> Vec<u8>;

    /// Hash of an interior node from its children
    fn hash_children(&self, left: &[u8], right: &[u8]) -> Vec<u8>;
}

/// Registry of map hashers keyed by strategy
#[derive(Clone, Default)]
pub struct HasherRegistry {
    hashers: HashMap<HashStrategy, Arc<dyn MapHasher>>,
}

impl HasherRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in map hasher
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(HashStrategy::TestMapHasher, Arc::new(TestMapHasher));
        registry.register(HashStrategy::ConiksSha256, Arc::new(ConiksHasher::sha256()));
        registry.register(
            HashStrategy::ConiksSha512_256,
            Arc::new(ConiksHasher::sha512_256()),
        );
        registry
    }

    /// Register (or replace) the hasher for `strategy`
    pub fn register(&mut self, strategy: HashStrategy, hasher: Arc<dyn MapHasher>) {
        self.hashers.insert(strategy, hasher);
    }

    /// Look up the map hasher for a strategy
    ///
    /// # Errors
    ///
    /// `UnknownHashStrategy` if nothing is registered for it
    pub fn map_hasher(&self, strategy: HashStrategy) -> MapStorageResult<Arc<dyn MapHasher>> {
        self.hashers
            .get(&strategy)
            .cloned()
            .ok_or_else(|| MapStorageError::UnknownHashStrategy(strategy.to_string()))
    }
}

impl std::fmt::Debug for HasherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut strategies: Vec<_> = self.hashers.keys().map(|s| s.as_str()).collect();
        strategies.sort_unstable();
        f.debug_struct("HasherRegistry")
            .field("strategies", &strategies)
            .finish()
    }
}
