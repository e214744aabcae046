//! vmap-storage library exports

pub mod error;
pub mod hashers;
pub mod storage;
pub mod traits;
pub mod tree;
pub mod types;

// Re-exports
pub use error::{MapStorageError, MapStorageResult};
pub use storage::{MapSnapshot, MapStorage, MapTransaction, Opened, StorageConfig};
pub use traits::{MapTx, ReadOnlyMapTx};
