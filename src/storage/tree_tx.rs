//! Base transaction shared by tree types
//!
//! Owns one pooled connection with an open SQLite transaction, the subtree
//! cache and the write revision. Map transactions are built on top of it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, InterruptHandle};

use crate::error::{MapStorageError, MapStorageResult};
use crate::storage::sqlite::convert::to_db_int;
use crate::storage::sqlite::pool::PooledConnection;
use crate::storage::subtree::{SubtreeCache, SubtreeRecord};

/// Most keys bound into a single `IN (...)` lookup
pub const MAX_IN_LIST: usize = 512;

const INSERT_SUBTREE_SQL: &str = "INSERT INTO Subtree (TreeId, SubtreeId, Nodes, SubtreeRevision) \
     VALUES (?1, ?2, ?3, ?4)";

/// Error returned by operations on a cancelled transaction.
///
/// Reported the same way SQLite reports an interrupted statement.
pub(crate) fn interrupted() -> MapStorageError {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
        Some("transaction cancelled".into()),
    )
    .into()
}

/// Cancels a transaction from another thread
///
/// Interrupts the statement in flight (if any); every later operation on the
/// transaction, commit included, fails as interrupted. Once the transaction
/// has finished, cancelling is a no-op: the connection may already serve
/// another transaction.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

/// The interrupt is only issued under `flags`, and `finished` is set under it
/// before the connection can go back to the pool.
struct CancelState {
    flags: Mutex<CancelFlags>,
    interrupt: InterruptHandle,
}

#[derive(Default)]
struct CancelFlags {
    cancelled: bool,
    finished: bool,
}

impl CancelHandle {
    fn new(interrupt: InterruptHandle) -> Self {
        Self {
            inner: Arc::new(CancelState {
                flags: Mutex::new(CancelFlags::default()),
                interrupt,
            }),
        }
    }

    pub fn cancel(&self) {
        let mut flags = self.flags();
        if flags.finished {
            return;
        }
        flags.cancelled = true;
        self.inner.interrupt.interrupt();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags().cancelled
    }

    /// Detach from the connection; later cancels do nothing
    fn finish(&self) {
        self.flags().finished = true;
    }

    fn flags(&self) -> MutexGuard<'_, CancelFlags> {
        self.inner.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    Closed,
}

/// The database transaction behind one map (or log) transaction
pub struct TreeTx {
    conn: PooledConnection,
    tree_id: i64,
    read_only: bool,
    cache: SubtreeCache,
    write_revision: Option<u64>,
    state: TxState,
    cancel: CancelHandle,
}

impl TreeTx {
    /// Start a transaction on `conn`.
    ///
    /// Read-only transactions take their snapshot at the first read.
    /// Read-write transactions take the write lock immediately, so anything
    /// read at open time stays consistent with what gets written.
    pub fn begin(conn: PooledConnection, cache: SubtreeCache, read_only: bool) -> MapStorageResult<Self> {
        conn.execute_batch(if read_only {
            "BEGIN DEFERRED"
        } else {
            "BEGIN IMMEDIATE"
        })?;

        let cancel = CancelHandle::new(conn.get_interrupt_handle());
        Ok(Self {
            conn,
            tree_id: cache.tree_id(),
            read_only,
            cache,
            write_revision: None,
            state: TxState::Open,
            cancel,
        })
    }

    pub fn tree_id(&self) -> i64 {
        self.tree_id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn write_revision(&self) -> Option<u64> {
        self.write_revision
    }

    pub fn set_write_revision(&mut self, revision: u64) {
        self.write_revision = Some(revision);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The connection, for statements issued by the tree-type layer
    ///
    /// # Errors
    ///
    /// `TransactionFinished` after commit or close, interrupted after cancel
    pub fn conn(&self) -> MapStorageResult<&Connection> {
        self.ensure_open()?;
        Ok(&self.conn)
    }

    fn ensure_open(&self) -> MapStorageResult<()> {
        if self.state != TxState::Open {
            return Err(MapStorageError::TransactionFinished);
        }
        if self.cancel.is_cancelled() {
            return Err(interrupted());
        }
        Ok(())
    }

    /// Subtrees rooted at `prefixes` as of `revision`, in request order.
    ///
    /// Each prefix resolves to its row with the greatest revision not above
    /// `revision`; prefixes with no such row are left out. Results (absent
    /// ones included) are cached for the rest of the transaction.
    pub fn get_subtrees(
        &mut self,
        revision: u64,
        prefixes: &[Vec<u8>],
    ) -> MapStorageResult<Vec<SubtreeRecord>> {
        self.ensure_open()?;

        let mut queued: HashSet<&[u8]> = HashSet::new();
        let missing: Vec<&[u8]> = prefixes
            .iter()
            .map(Vec::as_slice)
            .filter(|p| self.cache.cached(revision, p).is_none() && queued.insert(*p))
            .collect();

        for chunk in missing.chunks(MAX_IN_LIST) {
            let mut found = self.query_subtrees(revision, chunk)?;
            for prefix in chunk {
                let record = found.remove(*prefix);
                self.cache.remember(revision, prefix.to_vec(), record);
            }
        }

        let mut out = Vec::with_capacity(prefixes.len());
        let mut seen: HashSet<&[u8]> = HashSet::with_capacity(prefixes.len());
        for prefix in prefixes {
            if !seen.insert(prefix.as_slice()) {
                continue;
            }
            if let Some(Some(record)) = self.cache.cached(revision, prefix) {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    fn query_subtrees(
        &self,
        revision: u64,
        prefixes: &[&[u8]],
    ) -> MapStorageResult<HashMap<Vec<u8>, SubtreeRecord>> {
        let placeholders = vec!["?"; prefixes.len()].join(", ");
        let sql = format!(
            "SELECT x.SubtreeId, s.Nodes \
             FROM (SELECT SubtreeId, MAX(SubtreeRevision) AS MaxRevision \
                   FROM Subtree \
                   WHERE TreeId = ? AND SubtreeRevision <= ? AND SubtreeId IN ({}) \
                   GROUP BY SubtreeId) AS x \
             INNER JOIN Subtree s \
               ON s.TreeId = ? AND s.SubtreeId = x.SubtreeId AND s.SubtreeRevision = x.MaxRevision",
            placeholders
        );

        let mut values = Vec::with_capacity(prefixes.len() + 3);
        values.push(Value::Integer(self.tree_id));
        values.push(Value::Integer(to_db_int(revision)?));
        values.extend(prefixes.iter().map(|p| Value::Blob(p.to_vec())));
        values.push(Value::Integer(self.tree_id));

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut records = HashMap::with_capacity(prefixes.len());
        for row in rows {
            let (prefix, nodes) = row?;
            let mut record = SubtreeRecord::from_bytes(&nodes)?;
            // The row key is authoritative over the encoded prefix.
            record.prefix = prefix.clone();
            records.insert(prefix, record);
        }
        Ok(records)
    }

    /// Stage subtrees for writing at commit.
    ///
    /// Stops at the first invalid record; records staged before it stay
    /// staged.
    pub fn add_subtrees(&mut self, records: Vec<SubtreeRecord>) -> MapStorageResult<()> {
        self.ensure_open()?;
        for record in records {
            self.cache.stage(record)?;
        }
        Ok(())
    }

    /// Write staged subtrees at the write revision and commit.
    ///
    /// # Errors
    ///
    /// `WriteRevisionNotPopulated` if subtrees are staged without a write
    /// revision. On any error the transaction stays open and is rolled back
    /// by `close` (or on drop).
    pub fn commit(&mut self) -> MapStorageResult<()> {
        self.ensure_open()?;

        let staged = self.cache.take_staged();
        let count = staged.len();
        if count > 0 {
            let revision = self
                .write_revision
                .ok_or(MapStorageError::WriteRevisionNotPopulated)?;
            let revision = to_db_int(revision)?;
            let mut stmt = self.conn.prepare_cached(INSERT_SUBTREE_SQL)?;
            for record in &staged {
                stmt.execute(params![self.tree_id, record.prefix, record.to_bytes()?, revision])?;
            }
        }

        // Cancellation may land while the inserts run.
        self.ensure_open()?;
        self.conn.execute_batch("COMMIT")?;
        self.state = TxState::Committed;
        self.cancel.finish();

        tracing::debug!(
            tree_id = self.tree_id,
            write_revision = ?self.write_revision,
            subtrees = count,
            "committed tree transaction"
        );
        Ok(())
    }

    /// Roll back unless already committed. Calling it again is a no-op.
    pub fn close(&mut self) -> MapStorageResult<()> {
        if self.state != TxState::Open {
            return Ok(());
        }
        self.state = TxState::Closed;
        self.cancel.finish();
        // SQLite may already have rolled back, e.g. after an interrupted write.
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

impl Drop for TreeTx {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(tree_id = self.tree_id, error = %e, "rollback on drop failed");
        }
    }
}

impl std::fmt::Debug for TreeTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeTx")
            .field("tree_id", &self.tree_id)
            .field("read_only", &self.read_only)
            .field("write_revision", &self.write_revision)
            .field("state", &self.state)
            .finish()
    }
}
