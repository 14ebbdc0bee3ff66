use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::error::DepGitError;

/// Largest frame, header included.
pub const MAX_PKT_LEN: usize = 65520;
/// Largest payload one frame can carry.
pub const MAX_PKT_PAYLOAD: usize = MAX_PKT_LEN - 4;

const FLUSH: &[u8; 4] = b"0000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Data(Bytes),
    Flush,
}

impl PktLine {
    pub fn is_flush(&self) -> bool {
        matches!(self, PktLine::Flush)
    }
}

pub fn encode(payload: &[u8]) -> Result<Bytes, DepGitError> {
    let mut buf = BytesMut::with_capacity(payload.len() + 4);
    encode_into(&mut buf, payload)?;
    Ok(buf.freeze())
}

pub fn encode_into(buf: &mut BytesMut, payload: &[u8]) -> Result<(), DepGitError> {
    if payload.len() > MAX_PKT_PAYLOAD {
        return Err(DepGitError::PktLineTooLong(payload.len()));
    }
    buf.put_slice(format!("{:04x}", payload.len() + 4).as_bytes());
    buf.put_slice(payload);
    Ok(())
}

pub fn encode_flush() -> Bytes {
    Bytes::from_static(FLUSH)
}

/// Reads one frame. EOF before or inside the frame is a framing error.
pub async fn read_pkt_line<R>(reader: &mut R) -> Result<PktLine, DepGitError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 4];
    reader.read_exact(&mut head).await?;
    let len = parse_length(&head)?;
    if len == 0 {
        trace!("pkt-line flush");
        return Ok(PktLine::Flush);
    }
    let mut payload = vec![0u8; len - 4];
    reader.read_exact(&mut payload).await?;
    trace!(len, "pkt-line data");
    Ok(PktLine::Data(Bytes::from(payload)))
}

/// Like [`read_pkt_line`] but a clean EOF at a frame boundary yields `None`.
pub async fn read_pkt_line_opt<R>(reader: &mut R) -> Result<Option<PktLine>, DepGitError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 4];
    let mut filled = 0;
    while filled < head.len() {
        let n = reader.read(&mut head[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(DepGitError::UnexpectedEof);
        }
        filled += n;
    }
    let len = parse_length(&head)?;
    if len == 0 {
        return Ok(Some(PktLine::Flush));
    }
    let mut payload = vec![0u8; len - 4];
    reader.read_exact(&mut payload).await?;
    Ok(Some(PktLine::Data(Bytes::from(payload))))
}

fn parse_length(head: &[u8; 4]) -> Result<usize, DepGitError> {
    let invalid = || DepGitError::InvalidPktLength(String::from_utf8_lossy(head).into_owned());
    // from_str_radix would accept a leading '+'
    if !head.iter().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let text = std::str::from_utf8(head).map_err(|_| invalid())?;
    let len = usize::from_str_radix(text, 16).map_err(|_| invalid())?;
    match len {
        0 => Ok(0),
        1..=3 => Err(invalid()),
        n if n > MAX_PKT_LEN => Err(invalid()),
        n => Ok(n),
    }
}

/// Side-band channel numbers used when the client asked for `side-band-64k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SideBand {
    Primary = 1,
    Progress = 2,
    Error = 3,
}

impl SideBand {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(band: u8) -> Option<SideBand> {
        match band {
            1 => Some(SideBand::Primary),
            2 => Some(SideBand::Progress),
            3 => Some(SideBand::Error),
            _ => None,
        }
    }

    /// Wraps `data` into as many band frames as needed.
    pub fn wrap(self, data: &[u8]) -> Result<Bytes, DepGitError> {
        let mut buf = BytesMut::with_capacity(data.len() + 16);
        for chunk in data.chunks(MAX_PKT_PAYLOAD - 1) {
            let mut frame = Vec::with_capacity(chunk.len() + 1);
            frame.push(self.to_u8());
            frame.extend_from_slice(chunk);
            encode_into(&mut buf, &frame)?;
        }
        Ok(buf.freeze())
    }
}
