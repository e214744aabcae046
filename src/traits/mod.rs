//! Trait definitions for map transactions

pub mod map_tx;

pub use map_tx::{MapTx, ReadOnlyMapTx};
