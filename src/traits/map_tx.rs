//! Capability traits of map transactions
//!
//! Snapshots only get the read half; read-write transactions get both.

use crate::error::MapStorageResult;
use crate::types::{MapLeaf, NodeId, SignedMapRoot, Tile};

/// Reads against one revision of a map
///
/// Methods take `&self`: an implementation serializes concurrent calls on
/// the same transaction internally.
pub trait ReadOnlyMapTx {
    /// Revision pinned by the last successful root lookup, if any
    fn read_revision(&self) -> Option<u64>;

    /// Leaves for `indexes` as of `revision`
    ///
    /// Each key resolves to the value written at the greatest revision not
    /// above `revision`. Keys with no such value are left out of the result,
    /// and an empty `indexes` yields an empty result. Every returned leaf's
    /// `index` is the key it was looked up by.
    fn get(&self, revision: u64, indexes: &[Vec<u8>]) -> MapStorageResult<Vec<MapLeaf>>;

    /// Tiles rooted at `ids` as of `revision`; ids with no stored tile are
    /// left out and stand for empty subtrees.
    fn get_tiles(&self, revision: u64, ids: &[NodeId]) -> MapStorageResult<Vec<Tile>>;

    /// Root stored at exactly `revision`
    ///
    /// # Errors
    ///
    /// `TreeNeedsInit` if revision 0 is missing, `RootNotFound` for any
    /// other missing revision.
    fn get_signed_map_root(&self, revision: u64) -> MapStorageResult<SignedMapRoot>;

    /// Most recent root of the tree
    ///
    /// # Errors
    ///
    /// `TreeNeedsInit` if the tree has no roots at all
    fn latest_signed_map_root(&self) -> MapStorageResult<SignedMapRoot>;
}

/// Writes at the transaction's write revision
pub trait MapTx: ReadOnlyMapTx {
    /// # Errors
    ///
    /// `WriteRevisionNotPopulated` unless the transaction established one
    fn write_revision(&self) -> MapStorageResult<u64>;

    /// Insert `leaf` under `key_hash` at the write revision.
    ///
    /// Setting a key twice in one revision is left to the caller to avoid.
    fn set(&self, key_hash: &[u8], leaf: &MapLeaf) -> MapStorageResult<()>;

    /// Stage tiles for writing at commit.
    ///
    /// Stops at the first tile that fails to encode; tiles before it stay
    /// staged until the transaction commits or is abandoned.
    fn set_tiles(&self, tiles: &[Tile]) -> MapStorageResult<()>;

    /// Insert a new root row
    ///
    /// # Errors
    ///
    /// Fails if a row for the same revision (or timestamp) already exists,
    /// or if anything other than exactly one row was written.
    fn store_signed_map_root(&self, root: &SignedMapRoot) -> MapStorageResult<()>;
}
