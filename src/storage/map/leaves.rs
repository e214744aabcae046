//! Leaf storage: inserts at the write revision, point-in-time reads

use std::collections::{HashMap, HashSet};

use rusqlite::params;
use rusqlite::types::Value;

use super::transaction::MapTxState;
use crate::error::{MapStorageError, MapStorageResult};
use crate::storage::sqlite::convert::to_db_int;
use crate::storage::tree_tx::MAX_IN_LIST;
use crate::types::MapLeaf;

const INSERT_MAP_LEAF_SQL: &str =
    "INSERT INTO MapLeaf (TreeId, KeyHash, MapRevision, LeafValue) VALUES (?1, ?2, ?3, ?4)";

/// Latest value at or below a revision for each key in an `IN` list
fn select_map_leaves_sql(keys: usize) -> String {
    format!(
        "SELECT t1.KeyHash, t1.LeafValue \
         FROM MapLeaf t1 \
         INNER JOIN ( \
             SELECT TreeId, KeyHash, MAX(MapRevision) AS MaxRevision \
             FROM MapLeaf t0 \
             WHERE t0.KeyHash IN ({}) AND t0.TreeId = ? AND t0.MapRevision <= ? \
             GROUP BY t0.TreeId, t0.KeyHash \
         ) t2 \
         ON t1.TreeId = t2.TreeId AND t1.KeyHash = t2.KeyHash AND t1.MapRevision = t2.MaxRevision",
        vec!["?"; keys].join(", ")
    )
}

impl MapTxState {
    pub(crate) fn set(&mut self, key_hash: &[u8], leaf: &MapLeaf) -> MapStorageResult<()> {
        let revision = self
            .tx
            .write_revision()
            .ok_or(MapStorageError::WriteRevisionNotPopulated)?;
        let value = leaf.to_bytes()?;

        let conn = self.tx.conn()?;
        conn.prepare_cached(INSERT_MAP_LEAF_SQL)?.execute(params![
            self.tree_id(),
            key_hash,
            to_db_int(revision)?,
            value
        ])?;
        Ok(())
    }

    pub(crate) fn get(&mut self, revision: u64, indexes: &[Vec<u8>]) -> MapStorageResult<Vec<MapLeaf>> {
        if indexes.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen: HashSet<&[u8]> = HashSet::with_capacity(indexes.len());
        let keys: Vec<&[u8]> = indexes
            .iter()
            .map(Vec::as_slice)
            .filter(|key| seen.insert(*key))
            .collect();

        let tree_id = self.tree_id();
        let db_revision = to_db_int(revision)?;
        let conn = self.tx.conn()?;

        let mut values: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        for chunk in keys.chunks(MAX_IN_LIST) {
            let mut args: Vec<Value> = chunk.iter().map(|k| Value::Blob(k.to_vec())).collect();
            args.push(Value::Integer(tree_id));
            args.push(Value::Integer(db_revision));

            let mut stmt = conn.prepare_cached(&select_map_leaves_sql(chunk.len()))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            for row in rows {
                let (key, value) = row?;
                values.insert(key, value);
            }
        }

        keys.into_iter()
            .filter_map(|key| values.get(key).map(|value| (key, value)))
            .map(|(key, value)| MapLeaf::from_stored(value, key).map_err(MapStorageError::from))
            .collect()
    }
}
