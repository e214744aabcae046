// File: src/storage/sqlite/mod.rs

pub mod convert;
pub mod pool;
pub mod schema;

// Public exports
pub use pool::{ConnectionPool, PooledConnection};
pub use schema::SCHEMA_VERSION;
