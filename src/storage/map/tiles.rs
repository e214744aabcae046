//! Tile reads and staged tile writes, addressed through the layout

use super::transaction::MapTxState;
use crate::error::{CodecError, MapStorageError, MapStorageResult};
use crate::storage::subtree::{marshal, unmarshal};
use crate::types::{NodeId, Tile};

impl MapTxState {
    pub(crate) fn get_tiles(&mut self, revision: u64, ids: &[NodeId]) -> MapStorageResult<Vec<Tile>> {
        let mut prefixes = Vec::with_capacity(ids.len());
        for id in ids {
            if !id.is_byte_aligned() {
                return Err(MapStorageError::InvalidArgument(format!(
                    "tile id {} is not byte aligned",
                    id
                )));
            }
            prefixes.push(id.path().to_vec());
        }

        let records = self.tx.get_subtrees(revision, &prefixes)?;
        let tiles = records
            .iter()
            .map(unmarshal)
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(tiles)
    }

    pub(crate) fn set_tiles(&mut self, tiles: &[Tile]) -> MapStorageResult<()> {
        for tile in tiles {
            let height = self.layout.tile_height(tile.id.bit_len())?;
            let record = marshal(tile, height)?;
            self.tx.add_subtrees(vec![record])?;
        }
        Ok(())
    }
}
