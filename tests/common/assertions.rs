//! Custom test assertions for map lookups

use vmap_storage::types::MapLeaf;
use vmap_storage::MapStorageResult;

/// Leaf values as strings, in result order
pub fn values(leaves: &[MapLeaf]) -> Vec<String> {
    leaves
        .iter()
        .map(|l| String::from_utf8_lossy(&l.leaf_value).into_owned())
        .collect()
}

/// Assert a lookup reported "tree needs init"
pub fn assert_needs_init<T: std::fmt::Debug>(result: MapStorageResult<T>) {
    match result {
        Err(e) => assert!(e.is_needs_init(), "expected needs-init, got {e}"),
        Ok(v) => panic!("expected needs-init, got {v:?}"),
    }
}

/// Assert a lookup reported a plain not-found (and not needs-init)
pub fn assert_not_found<T: std::fmt::Debug>(result: MapStorageResult<T>) {
    match result {
        Err(e) => {
            assert!(!e.is_needs_init(), "expected not-found, got needs-init");
            assert!(e.is_not_found(), "expected not-found, got {e}");
        }
        Ok(v) => panic!("expected not-found, got {v:?}"),
    }
}
