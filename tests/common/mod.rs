//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure including:
//! - Storage setup (in-memory and tempfile-backed)
//! - Builders for trees, leaves, roots and tiles
//! - Assertions over leaf lookups and needs-init results

#![allow(dead_code, unused_imports)]

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;

// Re-export frequently used crate types for convenience
pub use std::sync::Arc;
pub use vmap_storage::{MapStorage, MapStorageError, MapTx, ReadOnlyMapTx};
