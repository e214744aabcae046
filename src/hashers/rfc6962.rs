use sha2::{Digest, Sha256};

use super::MapHasher;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// RFC 6962 style SHA-256 map hasher for tests
#[derive(Debug, Clone, Copy, Default)]
pub struct TestMapHasher;

impl MapHasher for TestMapHasher {
    fn size(&self) -> usize {
        32
    }

    fn hash_leaf(&self, _tree_id: i64, _index: &[u8], leaf: &[u8]) -> Vec<u8> {
        let mut h = Sha256::new();
        h.update([LEAF_PREFIX]);
        h.update(leaf);
        h.finalize().to_vec()
    }

    fn hash_children(&self, left: &[u8], right: &[u8]) -> Vec<u8> {
        let mut h = Sha256::new();
        h.update([NODE_PREFIX]);
        h.update(left);
        h.update(right);
        h.finalize().to_vec()
    }
}
