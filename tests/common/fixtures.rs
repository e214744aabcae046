//! Test fixtures and storage setup utilities

use chrono::Utc;
use tempfile::TempDir;

use vmap_storage::hashers::{HasherRegistry, MapHasher, TestMapHasher};
use vmap_storage::storage::StorageConfig;
use vmap_storage::tree::{HashStrategy, Tree};
use vmap_storage::types::{MapLeaf, MapRootV1, NodeId, SignedMapRoot, Tile, TileNode};
use vmap_storage::{MapStorage, MapTx};

/// Base timestamp for roots written by `commit_revision`
pub const BASE_TIMESTAMP: u64 = 1_700_000_000_000_000_000;

/// A loaded map tree using the test hasher
pub fn map_tree(tree_id: i64) -> Tree {
    Tree::map(tree_id, HashStrategy::TestMapHasher, Utc::now())
}

/// Private in-memory storage (single connection)
pub fn memory_storage() -> MapStorage {
    MapStorage::in_memory().expect("Failed to create in-memory storage")
}

/// File-backed storage in WAL mode, allowing concurrent snapshots
pub fn file_storage() -> (TempDir, MapStorage) {
    file_storage_with(|config| config)
}

/// File-backed storage with a customised configuration
pub fn file_storage_with(tweak: impl FnOnce(StorageConfig) -> StorageConfig) -> (TempDir, MapStorage) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("map.db").to_string_lossy().to_string();
    let config = tweak(StorageConfig {
        max_connections: 4,
        busy_timeout_ms: 100,
        acquire_timeout_ms: 1_000,
        ..StorageConfig::at_path(path)
    });
    let storage = MapStorage::open(config, HasherRegistry::with_defaults())
        .expect("Failed to open file storage");
    (dir, storage)
}

/// 32-byte key hash filled with `n`
pub fn key(n: u8) -> Vec<u8> {
    vec![n; 32]
}

/// A leaf carrying `value`, hashed with the test hasher
pub fn leaf(value: &[u8]) -> MapLeaf {
    MapLeaf {
        index: Vec::new(),
        leaf_hash: TestMapHasher.hash_leaf(1, &[], value),
        leaf_value: value.to_vec(),
        extra_data: Vec::new(),
    }
}

pub fn timestamp_for(revision: u64) -> u64 {
    BASE_TIMESTAMP + revision * 1_000
}

/// A signed root at `revision`
pub fn signed_root(revision: u64, timestamp_nanos: u64) -> SignedMapRoot {
    let root = MapRootV1 {
        root_hash: vec![revision as u8; 32],
        timestamp_nanos,
        revision,
        metadata: b"test-mapper".to_vec(),
    };
    SignedMapRoot::new(&root, vec![0x5A; 64]).expect("Failed to encode root")
}

/// Commit one revision setting `writes` (key byte, value) and return it
pub fn commit_revision(storage: &MapStorage, tree: &Tree, writes: &[(u8, &str)]) -> u64 {
    storage
        .read_write_transaction(tree, |tx| {
            let revision = tx.write_revision()?;
            for (k, v) in writes {
                tx.set(&key(*k), &leaf(v.as_bytes()))?;
            }
            tx.store_signed_map_root(&signed_root(revision, timestamp_for(revision)))?;
            Ok(revision)
        })
        .expect("Failed to commit revision")
}

/// A tile at the root of the tree with leaves at the given first bytes
pub fn top_tile(leaves: &[u8], fill: u8) -> Tile {
    Tile::new(
        NodeId::root(),
        leaves
            .iter()
            .map(|b| TileNode {
                id: NodeId::from_bytes(&[*b]),
                hash: vec![fill; 32],
            })
            .collect(),
    )
}

/// A tile in the 176-bit terminal stratum, rooted at `prefix` (10 bytes)
pub fn terminal_tile(prefix: [u8; 10], suffixes: &[u8]) -> Tile {
    Tile::new(
        NodeId::from_bytes(&prefix),
        suffixes
            .iter()
            .map(|s| {
                let mut path = prefix.to_vec();
                path.extend_from_slice(&[*s; 22]);
                TileNode {
                    id: NodeId::from_bytes(&path),
                    hash: TestMapHasher.hash_children(&[*s], &[*s]),
                }
            })
            .collect(),
    )
}
