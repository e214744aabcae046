// File: src/storage/sqlite/convert.rs

use rusqlite::Row;

use crate::error::CodecError;
use crate::types::{MapRootV1, SignedMapRoot};

/// Revisions and timestamps are unsigned in the API but stored in signed
/// INTEGER columns.
pub fn to_db_int(value: u64) -> Result<i64, CodecError> {
    i64::try_from(value).map_err(|_| CodecError::OutOfRange(value))
}

/// Inverse of [`to_db_int`]; a negative column value is a codec error
pub fn from_db_int(value: i64) -> Result<u64, CodecError> {
    u64::try_from(value).map_err(|_| CodecError::OutOfRange(value as u64))
}

/// Column values of a `MapHead` row for a root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapHeadRow {
    pub timestamp: i64,
    pub root_hash: Vec<u8>,
    pub revision: i64,
    pub signature: Vec<u8>,
    pub mapper_data: Vec<u8>,
}

impl MapHeadRow {
    /// Decode the root payload into the columns it is stored under
    pub fn from_signed_root(root: &SignedMapRoot) -> Result<Self, CodecError> {
        let decoded = root.decode()?;
        Ok(Self {
            timestamp: to_db_int(decoded.timestamp_nanos)?,
            root_hash: decoded.root_hash,
            revision: to_db_int(decoded.revision)?,
            signature: root.signature.clone(),
            mapper_data: decoded.metadata,
        })
    }

    /// Rebuild the signed root from stored columns
    pub fn to_signed_root(&self) -> Result<SignedMapRoot, CodecError> {
        let root = MapRootV1 {
            root_hash: self.root_hash.clone(),
            timestamp_nanos: from_db_int(self.timestamp)?,
            revision: from_db_int(self.revision)?,
            metadata: self.mapper_data.clone(),
        };
        SignedMapRoot::new(&root, self.signature.clone())
    }
}

/// Convert a `MapHead` row (timestamp, hash, revision, signature, mapper data)
pub fn row_to_map_head(row: &Row) -> rusqlite::Result<MapHeadRow> {
    let timestamp: i64 = row.get(0)?;
    let root_hash: Vec<u8> = row.get(1)?;
    let revision: i64 = row.get(2)?;
    let signature: Vec<u8> = row.get(3)?;
    let mapper_data: Option<Vec<u8>> = row.get(4)?;

    Ok(MapHeadRow {
        timestamp,
        root_hash,
        revision,
        signature,
        mapper_data: mapper_data.unwrap_or_default(),
    })
}
