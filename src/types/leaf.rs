//! Map leaves

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// A leaf of the map, stored opaque at a (key hash, revision) position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLeaf {
    /// Key hash the leaf lives at
    pub index: Vec<u8>,

    /// Leaf hash as computed by the map hasher
    pub leaf_hash: Vec<u8>,

    /// Application value
    pub leaf_value: Vec<u8>,

    /// Mapper-specific data
    pub extra_data: Vec<u8>,
}

impl MapLeaf {
    /// Serialize for the `LeafValue` column
    ///
    /// # Errors
    ///
    /// `CodecError::Bincode` if serialization fails
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a stored leaf, overwriting its index with `key_hash`.
    ///
    /// The key it was stored under wins over whatever index the payload
    /// carries.
    ///
    /// # Errors
    ///
    /// `CodecError::EmptyLeaf` for an empty value, `CodecError::Bincode` if
    /// the value does not decode.
    pub fn from_stored(value: &[u8], key_hash: &[u8]) -> Result<Self, CodecError> {
        if value.is_empty() {
            return Err(CodecError::EmptyLeaf);
        }
        let mut leaf: MapLeaf = bincode::deserialize(value)?;
        leaf.index = key_hash.to_vec();
        Ok(leaf)
    }
}
