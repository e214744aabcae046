// File: src/storage/sqlite/schema.rs

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::MapStorageResult;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 2;

/// Create all tables (idempotent) and bring the schema to the latest version
pub fn create_tables(conn: &Connection) -> MapStorageResult<()> {
    let existing = current_version(conn)?;
    conn.execute_batch(SCHEMA_SQL)?;
    match existing {
        None => {
            conn.execute_batch(MIGRATE_V1_TO_V2)?;
            tracing::info!(version = SCHEMA_VERSION, "created map storage schema");
            set_version(conn)?;
        }
        Some(v) if v < SCHEMA_VERSION => migrate(conn, v)?,
        Some(_) => {}
    }
    Ok(())
}

/// Stored schema version, `None` for a fresh database
pub fn current_version(conn: &Connection) -> MapStorageResult<Option<u32>> {
    let table = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='map_config'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    if table.is_none() {
        return Ok(None);
    }

    let version = conn
        .query_row(
            "SELECT value FROM map_config WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .map(|v| v.parse().unwrap_or(1));
    Ok(version)
}

fn migrate(conn: &Connection, from: u32) -> MapStorageResult<()> {
    if from < 2 {
        // v1 had no index for "latest root" lookups
        conn.execute_batch(MIGRATE_V1_TO_V2)?;
    }
    tracing::info!(from, to = SCHEMA_VERSION, "migrated map storage schema");
    set_version(conn)
}

fn set_version(conn: &Connection) -> MapStorageResult<()> {
    let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
    conn.execute(
        "INSERT OR REPLACE INTO map_config (key, value, updated_at) VALUES ('schema_version', ?1, ?2)",
        params![SCHEMA_VERSION.to_string(), now],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Core configuration
CREATE TABLE IF NOT EXISTS map_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Signed map roots: one immutable row per (TreeId, MapRevision)
CREATE TABLE IF NOT EXISTS MapHead (
    TreeId INTEGER NOT NULL,
    MapHeadTimestamp INTEGER NOT NULL,      -- Unix nanoseconds
    RootHash BLOB NOT NULL,
    MapRevision INTEGER NOT NULL,
    RootSignature BLOB NOT NULL,
    MapperData BLOB,
    PRIMARY KEY (TreeId, MapHeadTimestamp)
);

CREATE UNIQUE INDEX IF NOT EXISTS MapHeadRevisionIdx ON MapHead(TreeId, MapRevision);

-- Map leaves: append-only, one row per (TreeId, KeyHash, MapRevision)
CREATE TABLE IF NOT EXISTS MapLeaf (
    TreeId INTEGER NOT NULL,
    KeyHash BLOB NOT NULL,
    MapRevision INTEGER NOT NULL,           -- Revision the value was set at
    LeafValue BLOB NOT NULL,
    PRIMARY KEY (TreeId, KeyHash, MapRevision)
);

-- Tiles, shared with log trees
CREATE TABLE IF NOT EXISTS Subtree (
    TreeId INTEGER NOT NULL,
    SubtreeId BLOB NOT NULL,                -- Tile root path bytes
    Nodes BLOB NOT NULL,                    -- Encoded SubtreeRecord
    SubtreeRevision INTEGER NOT NULL,
    PRIMARY KEY (TreeId, SubtreeId, SubtreeRevision)
);
"#;

const MIGRATE_V1_TO_V2: &str = r#"
CREATE INDEX IF NOT EXISTS MapHeadLatestIdx ON MapHead(TreeId, MapHeadTimestamp DESC, MapRevision DESC);
"#;
