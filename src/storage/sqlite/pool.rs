// File: src/storage/sqlite/pool.rs

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::error::{MapStorageResult, StorageError};
use crate::storage::config::StorageConfig;

/// Bounded pool of SQLite connections shared by every tree and transaction
///
/// File databases open connections lazily up to `max_connections`. An
/// in-memory database lives only as long as its connection, so it gets
/// exactly one connection, opened eagerly and never closed.
pub struct ConnectionPool {
    config: StorageConfig,
    max_connections: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

impl ConnectionPool {
    /// Create a pool for `config`
    ///
    /// Opens one connection up front so a bad path fails here rather than at
    /// the first transaction.
    pub fn new(config: StorageConfig) -> MapStorageResult<Arc<Self>> {
        let max_connections = if config.is_in_memory() {
            1
        } else {
            config.max_connections.max(1)
        };

        let first = open_connection(&config)?;
        let pool = Self {
            config,
            max_connections,
            state: Mutex::new(PoolState {
                idle: vec![first],
                open: 1,
            }),
            available: Condvar::new(),
        };
        Ok(Arc::new(pool))
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Number of connections currently open (idle or checked out)
    pub fn open_connections(&self) -> MapStorageResult<usize> {
        Ok(self.lock()?.open)
    }

    /// Number of connections waiting in the pool
    pub fn idle_connections(&self) -> MapStorageResult<usize> {
        Ok(self.lock()?.idle.len())
    }

    /// Check out a connection, waiting up to `acquire_timeout_ms` for one
    ///
    /// # Errors
    ///
    /// `PoolExhausted` if none frees up in time, or the open error if a new
    /// connection cannot be created.
    pub fn acquire(self: &Arc<Self>) -> MapStorageResult<PooledConnection> {
        let timeout = Duration::from_millis(self.config.acquire_timeout_ms);
        let deadline = Instant::now() + timeout;

        let mut state = self.lock()?;
        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection::new(Arc::clone(self), conn));
            }

            if state.open < self.max_connections {
                state.open += 1;
                drop(state);
                return match open_connection(&self.config) {
                    Ok(conn) => Ok(PooledConnection::new(Arc::clone(self), conn)),
                    Err(e) => {
                        let mut state = self.lock()?;
                        state.open -= 1;
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StorageError::PoolExhausted(self.config.acquire_timeout_ms).into());
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, remaining)
                .map_err(|_| StorageError::ConnectionFailed("lock poisoned".into()))?;
            state = guard;
        }
    }

    fn release(&self, conn: Connection) {
        match self.state.lock() {
            Ok(mut state) => {
                state.idle.push(conn);
                self.available.notify_one();
            }
            Err(_) => {
                tracing::warn!("connection pool lock poisoned, dropping connection");
            }
        }
    }

    fn lock(&self) -> MapStorageResult<MutexGuard<'_, PoolState>> {
        self.state
            .lock()
            .map_err(|_| StorageError::ConnectionFailed("lock poisoned".into()).into())
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("path", &self.config.path)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// A checked-out connection, returned to its pool on drop
///
/// A connection dropped with a transaction still open is rolled back before
/// it goes back to the pool.
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    conn: Option<Connection>,
}

impl PooledConnection {
    fn new(pool: Arc<ConnectionPool>, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
        self.pool.release(conn);
    }
}

/// Open a connection and apply the configured pragmas
fn open_connection(config: &StorageConfig) -> MapStorageResult<Connection> {
    let conn = if config.is_in_memory() {
        Connection::open_in_memory()
    } else {
        Connection::open(&config.path)
    }
    .map_err(|e| StorageError::ConnectionFailed(format!("failed to open db: {}", e)))?;

    configure_connection(&conn, config)?;
    Ok(conn)
}

/// Configure SQLite connection pragmas
fn configure_connection(conn: &Connection, config: &StorageConfig) -> MapStorageResult<()> {
    if config.wal_mode && !config.is_in_memory() {
        // journal_mode returns the resulting mode as a row
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
    }
    conn.busy_timeout(Duration::from_millis(u64::from(config.busy_timeout_ms)))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.set_prepared_statement_cache_capacity(64);
    Ok(())
}
