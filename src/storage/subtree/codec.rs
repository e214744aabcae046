//! Tile <-> stored subtree record conversion

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::types::{NodeId, Tile, TileNode};

/// Serialized form of a tile, stored in the `Subtree.Nodes` column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeRecord {
    /// Path bytes of the tile root (the `Subtree.SubtreeId` key)
    pub prefix: Vec<u8>,

    /// Tile height in bits
    pub depth: u32,

    /// Leaf hashes keyed by their path below the tile root
    pub leaves: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl SubtreeRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Encode `tile` as a subtree of the given height.
///
/// # Errors
///
/// `InvalidTile` if the root is not byte aligned, the height is not a
/// positive multiple of 8, a leaf is not exactly `height` bits below the
/// root, or the leaves are not in strictly ascending id order (so a
/// stored tile reads back exactly as written).
pub fn marshal(tile: &Tile, height: u32) -> Result<SubtreeRecord, CodecError> {
    if !tile.id.is_byte_aligned() {
        return Err(CodecError::InvalidTile(format!(
            "tile root {} is not byte aligned",
            tile.id
        )));
    }
    if height == 0 || height % 8 != 0 {
        return Err(CodecError::InvalidTile(format!(
            "tile height {} is not a positive multiple of 8",
            height
        )));
    }

    let root_bytes = tile.id.path().len();
    let leaf_depth = tile.id.bit_len() + height;
    let mut leaves = BTreeMap::new();
    let mut previous: Option<&NodeId> = None;
    for leaf in &tile.leaves {
        if leaf.id.bit_len() != leaf_depth || !leaf.id.is_descendant_of(&tile.id) {
            return Err(CodecError::InvalidTile(format!(
                "leaf {} is not at depth {} below {}",
                leaf.id, leaf_depth, tile.id
            )));
        }
        if let Some(prev) = previous.filter(|prev| **prev >= leaf.id) {
            return Err(CodecError::InvalidTile(format!(
                "leaf {} does not follow {} in ascending order",
                leaf.id, prev
            )));
        }
        previous = Some(&leaf.id);
        leaves.insert(leaf.id.path()[root_bytes..].to_vec(), leaf.hash.clone());
    }

    Ok(SubtreeRecord {
        prefix: tile.id.path().to_vec(),
        depth: height,
        leaves,
    })
}

/// Decode a stored subtree back into a tile, leaves in ascending id order.
///
/// # Errors
///
/// `InvalidTile` if the record's depth or a leaf suffix is malformed
pub fn unmarshal(record: &SubtreeRecord) -> Result<Tile, CodecError> {
    if record.depth == 0 || record.depth % 8 != 0 {
        return Err(CodecError::InvalidTile(format!(
            "stored tile depth {} is not a positive multiple of 8",
            record.depth
        )));
    }
    let suffix_len = (record.depth / 8) as usize;

    let mut leaves = Vec::with_capacity(record.leaves.len());
    for (suffix, hash) in &record.leaves {
        if suffix.len() != suffix_len {
            return Err(CodecError::InvalidTile(format!(
                "leaf suffix of {} bytes in a tile of height {}",
                suffix.len(),
                record.depth
            )));
        }
        let mut path = Vec::with_capacity(record.prefix.len() + suffix_len);
        path.extend_from_slice(&record.prefix);
        path.extend_from_slice(suffix);
        leaves.push(TileNode {
            id: NodeId::from_bytes(&path),
            hash: hash.clone(),
        });
    }

    Ok(Tile {
        id: NodeId::from_bytes(&record.prefix),
        leaves,
    })
}
