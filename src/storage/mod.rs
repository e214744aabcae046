//! Storage module
//!
//! Map transactions over a pooled SQLite backend: layout-driven tile
//! addressing, the shared base transaction, and the map storage factory.

pub mod async_tx;
pub mod config;
pub mod layout;
pub mod map;
pub mod sqlite;
pub mod subtree;
pub mod tree_tx;

// Re-export main storage types
pub use config::StorageConfig;
pub use layout::{Layout, DEFAULT_MAP_STRATA};
pub use map::{MapSnapshot, MapStorage, MapTransaction, Opened};
pub use tree_tx::CancelHandle;
