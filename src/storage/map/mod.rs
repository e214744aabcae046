//! Map storage: opens map transactions over the shared connection pool

mod leaves;
mod roots;
mod tiles;
mod transaction;

use std::sync::Arc;

pub use transaction::{MapSnapshot, MapTransaction};

use transaction::MapTxState;

use crate::error::{CodecError, MapStorageError, MapStorageResult};
use crate::hashers::HasherRegistry;
use crate::storage::config::StorageConfig;
use crate::storage::layout::Layout;
use crate::storage::sqlite::pool::ConnectionPool;
use crate::storage::sqlite::schema;
use crate::storage::subtree::SubtreeCache;
use crate::storage::tree_tx::TreeTx;
use crate::tree::{Tree, TreeType};

/// A freshly opened read-write transaction
#[derive(Debug)]
pub enum Opened {
    /// The tree has roots; the write revision is one past the latest
    Ready(MapTransaction),

    /// The tree has no root yet; the write revision is 0
    NeedsInit(MapTransaction),
}

impl Opened {
    pub fn needs_init(&self) -> bool {
        matches!(self, Opened::NeedsInit(_))
    }

    pub fn into_transaction(self) -> MapTransaction {
        match self {
            Opened::Ready(tx) | Opened::NeedsInit(tx) => tx,
        }
    }
}

/// Map storage over SQLite
///
/// Cheap to clone; clones share the connection pool, layout and hashers.
#[derive(Debug, Clone)]
pub struct MapStorage {
    pool: Arc<ConnectionPool>,
    layout: Arc<Layout>,
    hashers: Arc<HasherRegistry>,
}

impl MapStorage {
    /// Open (creating or migrating the schema if needed)
    pub fn open(config: StorageConfig, hashers: HasherRegistry) -> MapStorageResult<Self> {
        let layout = Layout::new(&config.strata)?;
        let pool = ConnectionPool::new(config)?;
        {
            let conn = pool.acquire()?;
            schema::create_tables(&conn)?;
        }

        tracing::debug!(
            path = %pool.config().path,
            max_connections = pool.max_connections(),
            strata = ?layout.heights(),
            "opened map storage"
        );
        Ok(Self {
            pool,
            layout: Arc::new(layout),
            hashers: Arc::new(hashers),
        })
    }

    /// Private in-memory storage with the built-in hashers (for testing)
    pub fn in_memory() -> MapStorageResult<Self> {
        Self::open(StorageConfig::in_memory(), HasherRegistry::with_defaults())
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Layout of `tree`; every tree currently uses the configured strata
    pub fn layout(&self, _tree: &Tree) -> Arc<Layout> {
        Arc::clone(&self.layout)
    }

    /// Liveness probe against the database
    pub fn check_database_accessible(&self) -> MapStorageResult<()> {
        let conn = self.pool.acquire()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Read-only snapshot of `tree`; its revision is pinned by the first
    /// root lookup.
    pub fn snapshot_for_tree(&self, tree: &Tree) -> MapStorageResult<MapSnapshot> {
        let tx = self.begin(tree, true)?.into_transaction();
        Ok(MapSnapshot::new(tx))
    }

    /// Read-write transaction on `tree`, at one past its latest revision
    ///
    /// A tree without roots opens as [`Opened::NeedsInit`] with write
    /// revision 0.
    pub fn begin_for_tree(&self, tree: &Tree) -> MapStorageResult<Opened> {
        self.begin(tree, false)
    }

    /// Run `f` in a read-write transaction and commit if it succeeds.
    ///
    /// A tree without roots is handed to `f` with write revision 0
    /// ([`MapTransaction::needs_init`] is true). Any error rolls the
    /// transaction back.
    pub fn read_write_transaction<T, F>(&self, tree: &Tree, f: F) -> MapStorageResult<T>
    where
        F: FnOnce(&MapTransaction) -> MapStorageResult<T>,
    {
        let tx = self.begin_for_tree(tree)?.into_transaction();
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn begin(&self, tree: &Tree, read_only: bool) -> MapStorageResult<Opened> {
        if tree.update_time.is_none() {
            return Err(MapStorageError::TreeNotLoaded);
        }
        if tree.tree_type != TreeType::Map {
            return Err(MapStorageError::WrongTreeType {
                got: tree.tree_type,
                want: TreeType::Map,
            });
        }
        let hasher = self.hashers.map_hasher(tree.hash_strategy)?;

        let cache = SubtreeCache::new(Arc::clone(&self.layout), tree.tree_id, hasher.size());
        let tx = TreeTx::begin(self.pool.acquire()?, cache, read_only)?;
        let mut state = MapTxState::new(tx, self.layout(tree));

        if read_only {
            tracing::debug!(tree_id = tree.tree_id, "began map snapshot");
            return Ok(Opened::Ready(MapTransaction::new(state, hasher, false)));
        }

        match state.latest_signed_map_root() {
            Ok(root) => {
                let revision = root.decode()?.revision;
                let write_revision = revision
                    .checked_add(1)
                    .ok_or(CodecError::OutOfRange(revision))?;
                state.read_revision = Some(revision);
                state.tx.set_write_revision(write_revision);
                tracing::debug!(
                    tree_id = tree.tree_id,
                    read_revision = revision,
                    write_revision,
                    "began map transaction"
                );
                Ok(Opened::Ready(MapTransaction::new(state, hasher, false)))
            }
            Err(e) if e.is_needs_init() => {
                state.tx.set_write_revision(0);
                tracing::debug!(tree_id = tree.tree_id, "began map transaction on uninitialised tree");
                Ok(Opened::NeedsInit(MapTransaction::new(state, hasher, true)))
            }
            Err(e) => Err(e),
        }
    }
}
