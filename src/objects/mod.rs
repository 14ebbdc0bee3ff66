use std::io::{Read, Write};

use bstr::ByteSlice;
use bytes::Bytes;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::DepGitError;
use crate::objects::types::ObjectType;
use crate::sha::HashValue;

pub mod delta;
pub mod types;

/// One fully resolved object taken out of a received pack.
///
/// Delta entries are already applied, so `object_type` is always one of
/// commit, tree, blob or tag and `size == content.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedObject {
    pub id: HashValue,
    pub object_type: ObjectType,
    pub size: u64,
    /// Byte offset of the entry header inside the pack.
    pub position: u64,
    pub content: Bytes,
}

impl EncodedObject {
    pub fn new(object_type: ObjectType, position: u64, content: Bytes) -> Self {
        EncodedObject {
            id: object_type.hash_value(&content),
            object_type,
            size: content.len() as u64,
            position,
            content,
        }
    }

    /// Zlib-compressed `"<type> <size>\0<content>"`, the on-disk loose format.
    pub fn to_loose(&self) -> Result<Bytes, DepGitError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(format!("{} {}\0", self.object_type, self.content.len()).as_bytes())?;
        encoder.write_all(&self.content)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    pub fn from_loose(compressed: &[u8]) -> Result<Self, DepGitError> {
        let mut raw = Vec::new();
        ZlibDecoder::new(compressed)
            .read_to_end(&mut raw)
            .map_err(|e| DepGitError::DecompressionError(e.to_string()))?;
        let nul = raw.find_byte(0).ok_or(DepGitError::InvalidLooseObject)?;
        let header = raw[..nul].to_str().map_err(|_| DepGitError::InvalidLooseObject)?;
        let (kind, size) = header.split_once(' ').ok_or(DepGitError::InvalidLooseObject)?;
        let object_type = ObjectType::from_name(kind).ok_or(DepGitError::InvalidLooseObject)?;
        let size: u64 = size.parse().map_err(|_| DepGitError::InvalidLooseObject)?;
        let content = Bytes::copy_from_slice(&raw[nul + 1..]);
        if content.len() as u64 != size {
            return Err(DepGitError::SizeMismatch {
                declared: size,
                actual: content.len() as u64,
            });
        }
        Ok(EncodedObject::new(object_type, 0, content))
    }
}
