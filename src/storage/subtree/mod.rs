//! Subtree (tile) storage helpers shared by tree transactions

pub mod cache;
pub mod codec;

pub use cache::SubtreeCache;
pub use codec::{marshal, unmarshal, SubtreeRecord};
