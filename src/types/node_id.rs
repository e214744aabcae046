//! Bit-string addresses of sparse Merkle tree nodes

use serde::{Deserialize, Serialize};

use crate::error::{MapStorageError, MapStorageResult};

/// Node address: the first `bit_len` bits of `path`, most significant first.
///
/// Bits past `bit_len` in the final byte are always zero, so two ids are equal
/// exactly when they address the same node. Ids of equal length order the same
/// way as their positions in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawNodeId")]
pub struct NodeId {
    path: Vec<u8>,
    bit_len: u32,
}

/// Wire shape of a node id, checked by [`NodeId::new`] on the way in
#[derive(Deserialize)]
struct RawNodeId {
    path: Vec<u8>,
    bit_len: u32,
}

impl TryFrom<RawNodeId> for NodeId {
    type Error = MapStorageError;

    fn try_from(raw: RawNodeId) -> Result<Self, Self::Error> {
        NodeId::new(raw.path, raw.bit_len)
    }
}

impl NodeId {
    /// The tree root (empty path)
    pub fn root() -> Self {
        Self {
            path: Vec::new(),
            bit_len: 0,
        }
    }

    /// A byte-aligned id covering all of `path`
    pub fn from_bytes(path: &[u8]) -> Self {
        Self {
            path: path.to_vec(),
            bit_len: (path.len() * 8) as u32,
        }
    }

    /// Build an id from the leading `bit_len` bits of `path`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `path` is not exactly the bytes needed for
    /// `bit_len` bits, or has non-zero bits past `bit_len`.
    pub fn new(path: Vec<u8>, bit_len: u32) -> MapStorageResult<Self> {
        let want = bytes_for(bit_len);
        if path.len() != want {
            return Err(MapStorageError::InvalidArgument(format!(
                "node id of {} bits needs {} bytes, got {}",
                bit_len,
                want,
                path.len()
            )));
        }
        let id = Self { path, bit_len };
        if id.prefix(bit_len).path != id.path {
            return Err(MapStorageError::InvalidArgument(format!(
                "node id has bits set past bit {}",
                bit_len
            )));
        }
        Ok(id)
    }

    pub fn bit_len(&self) -> u32 {
        self.bit_len
    }

    pub fn path(&self) -> &[u8] {
        &self.path
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_len % 8 == 0
    }

    /// The ancestor at depth `bits` (or `self` if `bits >= bit_len`)
    pub fn prefix(&self, bits: u32) -> NodeId {
        let bits = bits.min(self.bit_len);
        let mut path = self.path[..bytes_for(bits)].to_vec();
        let rem = bits % 8;
        if rem != 0 {
            if let Some(last) = path.last_mut() {
                *last &= 0xFFu8 << (8 - rem);
            }
        }
        NodeId {
            path,
            bit_len: bits,
        }
    }

    /// True if `self` lies in the subtree rooted at `ancestor` (or is it)
    pub fn is_descendant_of(&self, ancestor: &NodeId) -> bool {
        ancestor.bit_len <= self.bit_len && self.prefix(ancestor.bit_len) == *ancestor
    }

    /// Bit at position `i` (0 = most significant), if within the id
    pub fn bit(&self, i: u32) -> Option<bool> {
        if i >= self.bit_len {
            return None;
        }
        let byte = self.path[(i / 8) as usize];
        Some(byte & (0x80 >> (i % 8)) != 0)
    }
}

fn bytes_for(bits: u32) -> usize {
    bits.div_ceil(8) as usize
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", hex::encode(&self.path), self.bit_len)
    }
}
