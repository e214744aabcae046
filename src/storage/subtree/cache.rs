//! Per-transaction subtree cache: memoized reads and staged writes

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::codec::SubtreeRecord;
use crate::error::{CodecError, MapStorageResult};
use crate::storage::layout::Layout;

/// Subtrees read and written by one transaction.
///
/// Reads are remembered per (revision, prefix), absent subtrees included, so
/// repeated lookups inside a transaction see the same answer. Staged writes
/// are invisible to reads until the transaction commits.
#[derive(Debug)]
pub struct SubtreeCache {
    tree_id: i64,
    layout: Arc<Layout>,
    hash_size: usize,
    reads: HashMap<(u64, Vec<u8>), Option<SubtreeRecord>>,
    staged: BTreeMap<Vec<u8>, SubtreeRecord>,
}

impl SubtreeCache {
    pub fn new(layout: Arc<Layout>, tree_id: i64, hash_size: usize) -> Self {
        Self {
            tree_id,
            layout,
            hash_size,
            reads: HashMap::new(),
            staged: BTreeMap::new(),
        }
    }

    pub fn tree_id(&self) -> i64 {
        self.tree_id
    }

    /// `Some(result)` if `prefix` was already read at `revision`
    pub fn cached(&self, revision: u64, prefix: &[u8]) -> Option<Option<&SubtreeRecord>> {
        self.reads
            .get(&(revision, prefix.to_vec()))
            .map(Option::as_ref)
    }

    /// Remember the outcome of a read (`None` = no subtree stored)
    pub fn remember(&mut self, revision: u64, prefix: Vec<u8>, record: Option<SubtreeRecord>) {
        self.reads.insert((revision, prefix), record);
    }

    /// Stage a subtree for writing at commit; a later stage of the same
    /// prefix replaces an earlier one.
    ///
    /// # Errors
    ///
    /// `Layout` if the prefix is not a tile root of this layout,
    /// `InvalidTile` if the depth disagrees with the layout or a hash has the
    /// wrong size.
    pub fn stage(&mut self, record: SubtreeRecord) -> MapStorageResult<()> {
        let root_depth = (record.prefix.len() * 8) as u32;
        let want = self.layout.tile_height(root_depth)?;
        if !self.layout.is_tile_boundary(root_depth) || record.depth != want {
            return Err(CodecError::InvalidTile(format!(
                "tile at depth {} has height {}, layout wants a tile root with height {}",
                root_depth, record.depth, want
            ))
            .into());
        }
        if let Some(bad) = record.leaves.values().find(|h| h.len() != self.hash_size) {
            return Err(CodecError::InvalidTile(format!(
                "{}-byte hash in tile {}, hasher produces {}",
                bad.len(),
                hex::encode(&record.prefix),
                self.hash_size
            ))
            .into());
        }
        self.staged.insert(record.prefix.clone(), record);
        Ok(())
    }

    /// Drain staged subtrees in prefix order
    pub fn take_staged(&mut self) -> Vec<SubtreeRecord> {
        std::mem::take(&mut self.staged).into_values().collect()
    }
}
