//! Streaming decoder for the packfile a client sends after its command block.
//!
//! Objects are yielded in file order as soon as each entry is inflated.
//! Delta entries are resolved against entries decoded earlier in the same
//! pack, which holds for every pack a client sends when `thin-pack` is not
//! advertised.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::error::DepGitError;
use crate::objects::EncodedObject;
use crate::objects::delta::apply_delta;
use crate::objects::types::ObjectType;
use crate::sha::HashValue;

pub mod pack_head;
pub mod zlib_decode;

const READ_CHUNK: usize = 16 * 1024;

/// Buffered reader that hashes every byte it hands out.
pub(crate) struct PackReader<R> {
    reader: R,
    buffer: BytesMut,
    hasher: Sha1,
    /// Bytes consumed since the start of the pack.
    pub(crate) offset: u64,
}

impl<R> PackReader<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(reader: R) -> Self {
        PackReader {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            hasher: Sha1::new(),
            offset: 0,
        }
    }

    async fn fill_more(&mut self) -> Result<(), DepGitError> {
        self.buffer.reserve(READ_CHUNK);
        let n = self.reader.read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(DepGitError::TruncatedPack);
        }
        Ok(())
    }

    async fn fill(&mut self, len: usize) -> Result<(), DepGitError> {
        while self.buffer.len() < len {
            self.fill_more().await?;
        }
        Ok(())
    }

    fn consume(&mut self, len: usize) -> Bytes {
        let chunk = self.buffer.split_to(len).freeze();
        self.hasher.update(&chunk);
        self.offset += len as u64;
        chunk
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Bytes, DepGitError> {
        self.fill(len).await?;
        Ok(self.consume(len))
    }

    async fn read_u8(&mut self) -> Result<u8, DepGitError> {
        self.fill(1).await?;
        Ok(self.consume(1)[0])
    }

    async fn read_object(&mut self, resolved: &Resolved) -> Result<EncodedObject, DepGitError> {
        let position = self.offset;
        let header = self.read_entry_header().await?;
        let kind = ObjectType::from_u8(header.type_code)
            .ok_or(DepGitError::InvalidObjectType(header.type_code))?;
        trace!(position, kind = %kind, size = header.size, "pack entry");

        match kind {
            ObjectType::OfsDelta => {
                let base_offset = self.read_ofs_base(position).await?;
                let delta = self.inflate(header.size).await?;
                let (base_type, base) = resolved.at_offset(base_offset).ok_or_else(|| {
                    DepGitError::MissingBaseObject(format!("at offset {}", base_offset))
                })?;
                let content = apply_delta(base, &delta)?;
                Ok(EncodedObject::new(base_type, position, content))
            }
            ObjectType::RefDelta => {
                let raw = self.read_bytes(HashValue::LEN).await?;
                let base_id = HashValue::from_bytes(&raw)
                    .ok_or_else(|| DepGitError::InvalidHash(hex::encode(&raw)))?;
                let delta = self.inflate(header.size).await?;
                let (base_type, base) = resolved
                    .by_id(&base_id)
                    .ok_or_else(|| DepGitError::MissingBaseObject(base_id.to_string()))?;
                let content = apply_delta(base, &delta)?;
                Ok(EncodedObject::new(base_type, position, content))
            }
            _ => {
                let content = self.inflate(header.size).await?;
                Ok(EncodedObject::new(kind, position, content))
            }
        }
    }

    async fn verify_trailer(&mut self) -> Result<(), DepGitError> {
        self.fill(HashValue::LEN).await?;
        let trailer = self.buffer.split_to(HashValue::LEN);
        let computed = std::mem::replace(&mut self.hasher, Sha1::new()).finalize();
        if trailer[..] != computed[..] {
            return Err(DepGitError::ChecksumMismatch);
        }
        Ok(())
    }
}

/// Objects decoded so far, addressable the two ways deltas refer to a base.
#[derive(Default)]
struct Resolved {
    entries: Vec<(ObjectType, Bytes)>,
    by_offset: HashMap<u64, usize>,
    by_id: HashMap<HashValue, usize>,
}

impl Resolved {
    fn insert(&mut self, object: &EncodedObject) {
        let index = self.entries.len();
        self.entries.push((object.object_type, object.content.clone()));
        self.by_offset.insert(object.position, index);
        self.by_id.insert(object.id, index);
    }

    fn at_offset(&self, offset: u64) -> Option<(ObjectType, &[u8])> {
        let index = *self.by_offset.get(&offset)?;
        let (kind, content) = &self.entries[index];
        Some((*kind, &content[..]))
    }

    fn by_id(&self, id: &HashValue) -> Option<(ObjectType, &[u8])> {
        let index = *self.by_id.get(id)?;
        let (kind, content) = &self.entries[index];
        Some((*kind, &content[..]))
    }
}

/// Decodes a packfile from `reader`.
///
/// The stream is single-pass. The trailing checksum is verified after the
/// last object, so a consumer must drain the stream to learn whether the
/// pack was intact.
pub fn decode_pack<R>(reader: R) -> impl Stream<Item = Result<EncodedObject, DepGitError>>
where
    R: AsyncRead + Unpin,
{
    async_stream::try_stream! {
        let mut pack = PackReader::new(reader);
        let count = pack.read_pack_header().await?;
        debug!(count, "decoding packfile");
        let mut resolved = Resolved::default();
        for _ in 0..count {
            let object = pack.read_object(&resolved).await?;
            resolved.insert(&object);
            yield object;
        }
        pack.verify_trailer().await?;
        debug!(count, bytes = pack.offset, "packfile verified");
    }
}
