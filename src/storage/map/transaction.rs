//! Map transactions and read-only snapshots

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{MapStorageError, MapStorageResult};
use crate::hashers::MapHasher;
use crate::storage::layout::Layout;
use crate::storage::tree_tx::{CancelHandle, TreeTx};
use crate::traits::{MapTx, ReadOnlyMapTx};
use crate::types::{MapLeaf, NodeId, SignedMapRoot, Tile};

/// Mutable state of a map transaction, only reachable through its mutex
pub(crate) struct MapTxState {
    pub(crate) tx: TreeTx,
    pub(crate) layout: Arc<Layout>,
    pub(crate) read_revision: Option<u64>,
}

impl MapTxState {
    pub(crate) fn new(tx: TreeTx, layout: Arc<Layout>) -> Self {
        Self {
            tx,
            layout,
            read_revision: None,
        }
    }

    pub(crate) fn tree_id(&self) -> i64 {
        self.tx.tree_id()
    }
}

/// A read-write map transaction
///
/// Every operation locks the transaction for its duration, so the same
/// transaction may be shared between threads. Dropping it without calling
/// [`commit`](Self::commit) rolls everything back.
pub struct MapTransaction {
    inner: Mutex<MapTxState>,
    tree_id: i64,
    needs_init: bool,
    hasher: Arc<dyn MapHasher>,
    cancel: CancelHandle,
}

impl MapTransaction {
    pub(crate) fn new(state: MapTxState, hasher: Arc<dyn MapHasher>, needs_init: bool) -> Self {
        let tree_id = state.tree_id();
        let cancel = state.tx.cancel_handle();
        Self {
            inner: Mutex::new(state),
            tree_id,
            needs_init,
            hasher,
            cancel,
        }
    }

    pub fn tree_id(&self) -> i64 {
        self.tree_id
    }

    /// True if the tree had no root when the transaction opened; the write
    /// revision is then 0.
    pub fn needs_init(&self) -> bool {
        self.needs_init
    }

    /// Hasher of the tree's hash strategy
    pub fn hasher(&self) -> &Arc<dyn MapHasher> {
        &self.hasher
    }

    /// Layout used to address the tree's tiles
    pub fn layout(&self) -> Arc<Layout> {
        Arc::clone(&self.state().layout)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn state(&self) -> MutexGuard<'_, MapTxState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist staged tiles and commit
    pub fn commit(self) -> MapStorageResult<()> {
        let mut state = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        state.tx.commit()
    }

    /// Roll back without committing
    pub fn close(self) -> MapStorageResult<()> {
        let mut state = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        state.tx.close()
    }
}

impl ReadOnlyMapTx for MapTransaction {
    fn read_revision(&self) -> Option<u64> {
        self.state().read_revision
    }

    fn get(&self, revision: u64, indexes: &[Vec<u8>]) -> MapStorageResult<Vec<MapLeaf>> {
        self.state().get(revision, indexes)
    }

    fn get_tiles(&self, revision: u64, ids: &[NodeId]) -> MapStorageResult<Vec<Tile>> {
        self.state().get_tiles(revision, ids)
    }

    fn get_signed_map_root(&self, revision: u64) -> MapStorageResult<SignedMapRoot> {
        self.state().get_signed_map_root(revision)
    }

    fn latest_signed_map_root(&self) -> MapStorageResult<SignedMapRoot> {
        self.state().latest_signed_map_root()
    }
}

impl MapTx for MapTransaction {
    fn write_revision(&self) -> MapStorageResult<u64> {
        self.state()
            .tx
            .write_revision()
            .ok_or(MapStorageError::WriteRevisionNotPopulated)
    }

    fn set(&self, key_hash: &[u8], leaf: &MapLeaf) -> MapStorageResult<()> {
        self.state().set(key_hash, leaf)
    }

    fn set_tiles(&self, tiles: &[Tile]) -> MapStorageResult<()> {
        self.state().set_tiles(tiles)
    }

    fn store_signed_map_root(&self, root: &SignedMapRoot) -> MapStorageResult<()> {
        self.state().store_signed_map_root(root)
    }
}

impl std::fmt::Debug for MapTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapTransaction")
            .field("tree_id", &self.tree_id)
            .field("needs_init", &self.needs_init)
            .finish()
    }
}

/// A read-only view of a map
///
/// The revision it observes is pinned by its first root lookup.
#[derive(Debug)]
pub struct MapSnapshot(MapTransaction);

impl MapSnapshot {
    pub(crate) fn new(tx: MapTransaction) -> Self {
        Self(tx)
    }

    pub fn tree_id(&self) -> i64 {
        self.0.tree_id()
    }

    pub fn hasher(&self) -> &Arc<dyn MapHasher> {
        self.0.hasher()
    }

    pub fn layout(&self) -> Arc<Layout> {
        self.0.layout()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.0.cancel_handle()
    }

    /// End the snapshot, releasing its connection
    pub fn commit(self) -> MapStorageResult<()> {
        self.0.commit()
    }

    pub fn close(self) -> MapStorageResult<()> {
        self.0.close()
    }
}

impl ReadOnlyMapTx for MapSnapshot {
    fn read_revision(&self) -> Option<u64> {
        self.0.read_revision()
    }

    fn get(&self, revision: u64, indexes: &[Vec<u8>]) -> MapStorageResult<Vec<MapLeaf>> {
        self.0.get(revision, indexes)
    }

    fn get_tiles(&self, revision: u64, ids: &[NodeId]) -> MapStorageResult<Vec<Tile>> {
        self.0.get_tiles(revision, ids)
    }

    fn get_signed_map_root(&self, revision: u64) -> MapStorageResult<SignedMapRoot> {
        self.0.get_signed_map_root(revision)
    }

    fn latest_signed_map_root(&self) -> MapStorageResult<SignedMapRoot> {
        self.0.latest_signed_map_root()
    }
}
