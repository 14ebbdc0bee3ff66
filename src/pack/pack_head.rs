use byteorder::{BigEndian, ByteOrder};
use tokio::io::AsyncRead;

use crate::error::DepGitError;
use crate::pack::PackReader;

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub type_code: u8,
    pub size: u64,
}

impl<R> PackReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Reads the 12-byte pack header and returns the object count.
    pub(crate) async fn read_pack_header(&mut self) -> Result<u32, DepGitError> {
        let head = self.read_bytes(12).await?;
        if &head[..4] != PACK_SIGNATURE {
            return Err(DepGitError::InvalidPackSignature);
        }
        let version = BigEndian::read_u32(&head[4..8]);
        if version != PACK_VERSION {
            return Err(DepGitError::UnsupportedPackVersion(version));
        }
        Ok(BigEndian::read_u32(&head[8..12]))
    }

    /// Type in bits 4-6 of the first byte, size in its low nibble plus
    /// little-endian 7-bit continuation groups.
    pub(crate) async fn read_entry_header(&mut self) -> Result<EntryHeader, DepGitError> {
        let mut byte = self.read_u8().await?;
        let type_code = (byte >> 4) & 0x07;
        let mut size = (byte & 0x0f) as u64;
        let mut shift = 4u32;
        while byte & 0x80 != 0 {
            if shift > 57 {
                return Err(DepGitError::EntrySizeOverflow);
            }
            byte = self.read_u8().await?;
            size |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
        }
        Ok(EntryHeader { type_code, size })
    }

    /// Decodes the ofs-delta back-reference and returns the base entry offset.
    pub(crate) async fn read_ofs_base(&mut self, entry_offset: u64) -> Result<u64, DepGitError> {
        let mut byte = self.read_u8().await?;
        let mut value = (byte & 0x7f) as u64;
        while byte & 0x80 != 0 {
            if value > (u64::MAX >> 8) {
                return Err(DepGitError::InvalidDelta("ofs-delta offset overflow"));
            }
            byte = self.read_u8().await?;
            value = ((value + 1) << 7) | (byte & 0x7f) as u64;
        }
        if value == 0 {
            return Err(DepGitError::InvalidDelta("ofs-delta points at itself"));
        }
        entry_offset
            .checked_sub(value)
            .ok_or(DepGitError::InvalidDelta("ofs-delta offset before pack start"))
    }
}
