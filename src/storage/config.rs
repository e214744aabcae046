// File: src/storage/config.rs

use crate::storage::layout::DEFAULT_MAP_STRATA;

/// Path that selects a private in-memory database
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Map storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Path to database file (or ":memory:" for in-memory)
    pub path: String,

    /// Enable WAL mode so snapshots can read while a writer is open
    pub wal_mode: bool,

    /// How long a statement waits on a locked database, in milliseconds
    pub busy_timeout_ms: u32,

    /// Upper bound on pooled connections (forced to 1 for in-memory)
    pub max_connections: usize,

    /// How long to wait for a free pooled connection, in milliseconds
    pub acquire_timeout_ms: u64,

    /// Tile heights from the root down, summing to the key size in bits
    pub strata: Vec<u32>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "vmap.db".to_string(),
            wal_mode: true,
            busy_timeout_ms: 5000,
            max_connections: 8,
            acquire_timeout_ms: 10_000,
            strata: DEFAULT_MAP_STRATA.to_vec(),
        }
    }
}

impl StorageConfig {
    /// Configuration for a private in-memory database
    pub fn in_memory() -> Self {
        Self {
            path: IN_MEMORY_PATH.to_string(),
            wal_mode: false,
            max_connections: 1,
            ..Default::default()
        }
    }

    /// Configuration for a database file at `path`
    pub fn at_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let path = std::env::var("VMAP_DATABASE_PATH").unwrap_or(defaults.path);

        let wal_mode = std::env::var("VMAP_WAL_MODE")
            .ok()
            .map(|s| s == "true" || s == "1")
            .unwrap_or(defaults.wal_mode);

        let busy_timeout_ms = std::env::var("VMAP_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.busy_timeout_ms);

        let max_connections = std::env::var("VMAP_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_connections);

        let acquire_timeout_ms = std::env::var("VMAP_ACQUIRE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.acquire_timeout_ms);

        let strata = std::env::var("VMAP_STRATA")
            .ok()
            .and_then(|s| parse_strata(&s))
            .unwrap_or(defaults.strata);

        Self {
            path,
            wal_mode,
            busy_timeout_ms,
            max_connections,
            acquire_timeout_ms,
            strata,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }
}

/// Parse "8,8,240" into heights; `None` if any entry is not a number
fn parse_strata(s: &str) -> Option<Vec<u32>> {
    let strata: Option<Vec<u32>> = s.split(',').map(|h| h.trim().parse().ok()).collect();
    strata.filter(|v| !v.is_empty())
}
