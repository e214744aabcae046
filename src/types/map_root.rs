//! Versioned map root descriptor and its signed envelope
//!
//! Binary layout of a version 1 root (big-endian):
//! - version (2 bytes, = 1)
//! - root hash length (1 byte) + root hash (up to 128 bytes)
//! - timestamp (8 bytes, Unix nanos)
//! - revision (8 bytes)
//! - metadata length (2 bytes) + metadata (up to 65535 bytes)

use std::io::Read;

use crate::error::CodecError;

/// Current root format version
pub const MAP_ROOT_VERSION: u16 = 1;

/// Longest accepted root hash
pub const MAX_ROOT_HASH_LEN: usize = 128;

/// Longest accepted mapper metadata
pub const MAX_METADATA_LEN: usize = u16::MAX as usize;

/// Decoded map root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRootV1 {
    pub root_hash: Vec<u8>,
    pub timestamp_nanos: u64,
    pub revision: u64,
    pub metadata: Vec<u8>,
}

impl MapRootV1 {
    /// Encode in the version 1 layout
    ///
    /// # Errors
    ///
    /// `FieldTooLong` if the hash or metadata exceed their length prefix
    pub fn marshal_binary(&self) -> Result<Vec<u8>, CodecError> {
        if self.root_hash.len() > MAX_ROOT_HASH_LEN {
            return Err(CodecError::FieldTooLong {
                field: "root_hash",
                len: self.root_hash.len(),
                max: MAX_ROOT_HASH_LEN,
            });
        }
        if self.metadata.len() > MAX_METADATA_LEN {
            return Err(CodecError::FieldTooLong {
                field: "metadata",
                len: self.metadata.len(),
                max: MAX_METADATA_LEN,
            });
        }

        let mut buf = Vec::with_capacity(21 + self.root_hash.len() + self.metadata.len());
        buf.extend_from_slice(&MAP_ROOT_VERSION.to_be_bytes());
        buf.push(self.root_hash.len() as u8);
        buf.extend_from_slice(&self.root_hash);
        buf.extend_from_slice(&self.timestamp_nanos.to_be_bytes());
        buf.extend_from_slice(&self.revision.to_be_bytes());
        buf.extend_from_slice(&(self.metadata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.metadata);
        Ok(buf)
    }

    /// Decode a version 1 root, rejecting truncated input and trailing bytes
    ///
    /// # Errors
    ///
    /// `UnsupportedVersion`, `Truncated`, `FieldTooLong` or `TrailingBytes`
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = data;

        let mut version = [0u8; 2];
        read_exact(&mut reader, &mut version, "version")?;
        let version = u16::from_be_bytes(version);
        if version != MAP_ROOT_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let mut hash_len = [0u8; 1];
        read_exact(&mut reader, &mut hash_len, "root hash length")?;
        let hash_len = hash_len[0] as usize;
        if hash_len > MAX_ROOT_HASH_LEN {
            return Err(CodecError::FieldTooLong {
                field: "root_hash",
                len: hash_len,
                max: MAX_ROOT_HASH_LEN,
            });
        }
        let mut root_hash = vec![0u8; hash_len];
        read_exact(&mut reader, &mut root_hash, "root hash")?;

        let mut word = [0u8; 8];
        read_exact(&mut reader, &mut word, "timestamp")?;
        let timestamp_nanos = u64::from_be_bytes(word);
        read_exact(&mut reader, &mut word, "revision")?;
        let revision = u64::from_be_bytes(word);

        let mut meta_len = [0u8; 2];
        read_exact(&mut reader, &mut meta_len, "metadata length")?;
        let mut metadata = vec![0u8; u16::from_be_bytes(meta_len) as usize];
        read_exact(&mut reader, &mut metadata, "metadata")?;

        if !reader.is_empty() {
            return Err(CodecError::TrailingBytes(reader.len()));
        }

        Ok(Self {
            root_hash,
            timestamp_nanos,
            revision,
            metadata,
        })
    }
}

fn read_exact(reader: &mut &[u8], buf: &mut [u8], what: &'static str) -> Result<(), CodecError> {
    reader
        .read_exact(buf)
        .map_err(|_| CodecError::Truncated(what))
}

/// A serialized root plus its detached signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMapRoot {
    /// `MapRootV1` encoding
    pub map_root: Vec<u8>,

    /// Signature over `map_root`
    pub signature: Vec<u8>,
}

impl SignedMapRoot {
    /// Wrap an encoded root with its signature
    ///
    /// # Errors
    ///
    /// Propagates `MapRootV1::marshal_binary` failures
    pub fn new(root: &MapRootV1, signature: Vec<u8>) -> Result<Self, CodecError> {
        Ok(Self {
            map_root: root.marshal_binary()?,
            signature,
        })
    }

    /// Decode the versioned root payload
    ///
    /// # Errors
    ///
    /// Propagates `MapRootV1::unmarshal_binary` failures
    pub fn decode(&self) -> Result<MapRootV1, CodecError> {
        MapRootV1::unmarshal_binary(&self.map_root)
    }
}
