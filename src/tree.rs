//! Tree descriptors supplied by metadata (admin) storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of tree a descriptor refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeType {
    Unknown,
    Log,
    PreorderedLog,
    Map,
}

/// Hash strategy identifier used to look up a hasher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashStrategy {
    Unknown,
    Rfc6962Sha256,
    TestMapHasher,
    ObjectRfc6962Sha256,
    ConiksSha512_256,
    ConiksSha256,
}

impl HashStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashStrategy::Unknown => "UNKNOWN_HASH_STRATEGY",
            HashStrategy::Rfc6962Sha256 => "RFC6962_SHA256",
            HashStrategy::TestMapHasher => "TEST_MAP_HASHER",
            HashStrategy::ObjectRfc6962Sha256 => "OBJECT_RFC6962_SHA256",
            HashStrategy::ConiksSha512_256 => "CONIKS_SHA512_256",
            HashStrategy::ConiksSha256 => "CONIKS_SHA256",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNKNOWN_HASH_STRATEGY" => Some(HashStrategy::Unknown),
            "RFC6962_SHA256" => Some(HashStrategy::Rfc6962Sha256),
            "TEST_MAP_HASHER" => Some(HashStrategy::TestMapHasher),
            "OBJECT_RFC6962_SHA256" => Some(HashStrategy::ObjectRfc6962Sha256),
            "CONIKS_SHA512_256" => Some(HashStrategy::ConiksSha512_256),
            "CONIKS_SHA256" => Some(HashStrategy::ConiksSha256),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tree metadata, immutable for the duration of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    /// Tree identifier
    pub tree_id: i64,

    /// Must be `TreeType::Map` for map storage
    pub tree_type: TreeType,

    /// Selects the hasher from the registry
    pub hash_strategy: HashStrategy,

    /// Set only when the descriptor was loaded from metadata storage
    pub update_time: Option<DateTime<Utc>>,
}

impl Tree {
    /// Descriptor for a map tree as loaded from metadata storage at `update_time`
    pub fn map(tree_id: i64, hash_strategy: HashStrategy, update_time: DateTime<Utc>) -> Self {
        Self {
            tree_id,
            tree_type: TreeType::Map,
            hash_strategy,
            update_time: Some(update_time),
        }
    }
}
