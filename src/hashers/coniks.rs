//! CONIKS map hasher (leaf hashes bound to tree id, index and depth)

use sha2::{Digest, Sha256, Sha512_256};

use super::MapHasher;

const LEAF_IDENTIFIER: &[u8] = b"L";

#[derive(Debug, Clone, Copy)]
enum Algorithm {
    Sha256,
    Sha512_256,
}

/// CONIKS hasher over SHA-256 or SHA-512/256
#[derive(Debug, Clone, Copy)]
pub struct ConiksHasher {
    algorithm: Algorithm,
}

impl ConiksHasher {
    pub fn sha256() -> Self {
        Self {
            algorithm: Algorithm::Sha256,
        }
    }

    pub fn sha512_256() -> Self {
        Self {
            algorithm: Algorithm::Sha512_256,
        }
    }

    fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        match self.algorithm {
            Algorithm::Sha256 => digest_with::<Sha256>(parts),
            Algorithm::Sha512_256 => digest_with::<Sha512_256>(parts),
        }
    }
}

fn digest_with<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut h = D::new();
    for part in parts {
        h.update(part);
    }
    h.finalize().to_vec()
}

impl MapHasher for ConiksHasher {
    fn size(&self) -> usize {
        32
    }

    fn hash_leaf(&self, tree_id: i64, index: &[u8], leaf: &[u8]) -> Vec<u8> {
        let depth = (index.len() * 8) as u32;
        self.digest(&[
            LEAF_IDENTIFIER,
            &tree_id.to_be_bytes(),
            index,
            &depth.to_be_bytes(),
            leaf,
        ])
    }

    fn hash_children(&self, left: &[u8], right: &[u8]) -> Vec<u8> {
        self.digest(&[left, right])
    }
}
