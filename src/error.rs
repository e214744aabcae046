//! Map storage error types

use thiserror::Error;

use crate::tree::TreeType;

/// Main map storage error type
#[derive(Debug, Error)]
pub enum MapStorageError {
    // ========== Usage Errors ==========
    /// Tree descriptor was not pulled from metadata storage
    #[error("tree.update_time is unset: tree must be pulled from storage")]
    TreeNotLoaded,

    /// Tree is not a map
    #[error("begin(tree.tree_type: {got:?}), want {want:?}")]
    WrongTreeType { got: TreeType, want: TreeType },

    /// Write revision read before it was established
    #[error("map transaction write revision not populated")]
    WriteRevisionNotPopulated,

    /// Operation on a transaction that was already committed or closed
    #[error("transaction already finished")]
    TransactionFinished,

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ========== Revision Errors ==========
    /// Tree has never had a root committed
    #[error("tree needs initialising")]
    TreeNeedsInit,

    /// No root at the requested revision of an initialised tree
    #[error("no signed map root for tree {tree_id} at revision {revision}")]
    RootNotFound { tree_id: i64, revision: u64 },

    /// Root does not come after the latest root in both revision and timestamp
    #[error("signed map root at revision {revision} for tree {tree_id} does not follow latest revision {latest_revision}")]
    StaleRoot {
        tree_id: i64,
        revision: u64,
        latest_revision: u64,
    },

    // ========== Collaborator Errors ==========
    /// No map hasher registered for the strategy
    #[error("no map hasher registered for hash strategy {0}")]
    UnknownHashStrategy(String),

    /// Strata configuration or depth lookup failed
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Leaf, root or tile (de)serialization failed
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    // ========== Backend Errors ==========
    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Backend-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Database connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No pooled connection became available in time
    #[error("connection pool exhausted after {0} ms")]
    PoolExhausted(u64),

    /// Transaction failed
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Statement affected an unexpected number of rows
    #[error("expected {expected} row(s) affected, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },
}

/// Strata configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("strata must not be empty")]
    EmptyStrata,

    #[error("stratum {index} has height {height}: must be a positive multiple of 8")]
    InvalidHeight { index: usize, height: u32 },

    #[error("strata sum to {0} bits, more than 256")]
    TooDeep(u32),

    #[error("depth {depth} outside layout of {total} bits")]
    DepthOutOfRange { depth: u32, total: u32 },
}

/// Serialization errors for leaves, roots and tiles
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("unsupported map root version {0}")]
    UnsupportedVersion(u16),

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("{0} trailing bytes after map root")]
    TrailingBytes(usize),

    #[error("{field} is {len} bytes, limit {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("empty leaf value")]
    EmptyLeaf,

    #[error("invalid tile: {0}")]
    InvalidTile(String),

    #[error("value {0} does not fit a signed 64-bit column")]
    OutOfRange(u64),
}

/// Map storage result type alias
pub type MapStorageResult<T> = Result<T, MapStorageError>;

impl MapStorageError {
    /// The tree has no committed root yet
    pub fn is_needs_init(&self) -> bool {
        matches!(self, MapStorageError::TreeNeedsInit)
    }

    /// The caller misused the API; retrying cannot help
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            MapStorageError::TreeNotLoaded
                | MapStorageError::WrongTreeType { .. }
                | MapStorageError::WriteRevisionNotPopulated
                | MapStorageError::TransactionFinished
                | MapStorageError::InvalidArgument(_)
                | MapStorageError::StaleRoot { .. }
        )
    }

    /// A specific revision of an initialised tree is missing
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MapStorageError::RootNotFound { .. }
                | MapStorageError::Storage(StorageError::Sqlite(
                    rusqlite::Error::QueryReturnedNoRows
                ))
        )
    }

    /// Check if error is transient (caller may retry the transaction)
    pub fn is_recoverable(&self) -> bool {
        match self {
            MapStorageError::Storage(StorageError::PoolExhausted(_)) => true,
            MapStorageError::Storage(StorageError::Sqlite(rusqlite::Error::SqliteFailure(
                e,
                _,
            ))) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// The in-flight statement was interrupted (cancelled)
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            MapStorageError::Storage(StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == rusqlite::ErrorCode::OperationInterrupted
        )
    }
}

impl From<rusqlite::Error> for MapStorageError {
    fn from(e: rusqlite::Error) -> Self {
        MapStorageError::Storage(StorageError::Sqlite(e))
    }
}

impl From<bincode::Error> for MapStorageError {
    fn from(e: bincode::Error) -> Self {
        MapStorageError::Codec(CodecError::Bincode(e))
    }
}
