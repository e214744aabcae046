//! Signed root persistence and lookup

use rusqlite::{params, OptionalExtension};

use super::transaction::MapTxState;
use crate::error::{MapStorageError, MapStorageResult, StorageError};
use crate::storage::sqlite::convert::{from_db_int, row_to_map_head, to_db_int, MapHeadRow};
use crate::types::SignedMapRoot;

const INSERT_MAP_HEAD_SQL: &str = "INSERT INTO MapHead \
     (TreeId, MapHeadTimestamp, RootHash, MapRevision, RootSignature, MapperData) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const SELECT_LATEST_SIGNED_MAP_ROOT_SQL: &str = "SELECT MapHeadTimestamp, RootHash, MapRevision, RootSignature, MapperData \
     FROM MapHead WHERE TreeId = ?1 \
     ORDER BY MapHeadTimestamp DESC, MapRevision DESC LIMIT 1";

const SELECT_SIGNED_MAP_ROOT_SQL: &str = "SELECT MapHeadTimestamp, RootHash, MapRevision, RootSignature, MapperData \
     FROM MapHead WHERE TreeId = ?1 AND MapRevision = ?2";

impl MapTxState {
    pub(crate) fn get_signed_map_root(&mut self, revision: u64) -> MapStorageResult<SignedMapRoot> {
        let tree_id = self.tree_id();
        let row = self
            .tx
            .conn()?
            .prepare_cached(SELECT_SIGNED_MAP_ROOT_SQL)?
            .query_row(params![tree_id, to_db_int(revision)?], row_to_map_head)
            .optional()?;

        match row {
            Some(row) => self.pin(&row),
            // Revision 0 is only missing if the tree was never initialised.
            None if revision == 0 => Err(MapStorageError::TreeNeedsInit),
            None => Err(MapStorageError::RootNotFound { tree_id, revision }),
        }
    }

    pub(crate) fn latest_signed_map_root(&mut self) -> MapStorageResult<SignedMapRoot> {
        match self.latest_row()? {
            Some(row) => self.pin(&row),
            None => Err(MapStorageError::TreeNeedsInit),
        }
    }

    /// Insert a root. It must be newer than the latest one in both revision
    /// and timestamp, or the latest-root ordering would stop moving forward.
    pub(crate) fn store_signed_map_root(&mut self, root: &SignedMapRoot) -> MapStorageResult<()> {
        let row = MapHeadRow::from_signed_root(root)?;
        let tree_id = self.tree_id();

        if let Some(latest) = self.latest_row()? {
            if row.timestamp <= latest.timestamp || row.revision <= latest.revision {
                tracing::warn!(
                    tree_id,
                    revision = row.revision,
                    timestamp = row.timestamp,
                    latest_revision = latest.revision,
                    latest_timestamp = latest.timestamp,
                    "rejecting signed map root older than latest"
                );
                return Err(MapStorageError::StaleRoot {
                    tree_id,
                    revision: from_db_int(row.revision)?,
                    latest_revision: from_db_int(latest.revision)?,
                });
            }
        }

        let result = self.tx.conn()?.prepare_cached(INSERT_MAP_HEAD_SQL).and_then(|mut stmt| {
            stmt.execute(params![
                tree_id,
                row.timestamp,
                row.root_hash,
                row.revision,
                row.signature,
                row.mapper_data
            ])
        });

        match result {
            Ok(1) => Ok(()),
            Ok(actual) => Err(StorageError::RowCountMismatch {
                expected: 1,
                actual,
            }
            .into()),
            Err(e) => {
                tracing::warn!(
                    tree_id,
                    revision = row.revision,
                    error = %e,
                    "failed to store signed map root"
                );
                Err(e.into())
            }
        }
    }

    fn latest_row(&mut self) -> MapStorageResult<Option<MapHeadRow>> {
        let tree_id = self.tree_id();
        let row = self
            .tx
            .conn()?
            .prepare_cached(SELECT_LATEST_SIGNED_MAP_ROOT_SQL)?
            .query_row(params![tree_id], row_to_map_head)
            .optional()?;
        Ok(row)
    }

    /// Track the revision of a fetched root. Snapshots keep the first one.
    fn pin(&mut self, row: &MapHeadRow) -> MapStorageResult<SignedMapRoot> {
        let root = row.to_signed_root()?;
        let revision = from_db_int(row.revision)?;
        if !self.tx.is_read_only() || self.read_revision.is_none() {
            self.read_revision = Some(revision);
        }
        Ok(root)
    }
}
