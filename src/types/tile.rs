//! Tiles: the unit of storage for internal map nodes

use super::node_id::NodeId;

/// A node hash inside a tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileNode {
    pub id: NodeId,
    pub hash: Vec<u8>,
}

/// Hashes of the bottom-most nodes of the subtree rooted at `id`.
///
/// A tile missing from storage is an all-empty subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Root of the tile, always at a stratum boundary
    pub id: NodeId,

    /// Non-empty leaves of the tile, in ascending id order
    pub leaves: Vec<TileNode>,
}

impl Tile {
    pub fn new(id: NodeId, leaves: Vec<TileNode>) -> Self {
        Self { id, leaves }
    }

    /// A tile with no stored hashes
    pub fn empty(id: NodeId) -> Self {
        Self {
            id,
            leaves: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}
