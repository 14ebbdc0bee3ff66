use bytes::Bytes;

use crate::error::DepGitError;

/// The result size comes from the client, so only this much is reserved up front.
const MAX_PREALLOC: usize = 1 << 20;

fn read_varint(delta: &[u8], pos: &mut usize) -> Result<usize, DepGitError> {
    let mut value = 0usize;
    let mut shift = 0u32;
    loop {
        let byte = *delta.get(*pos).ok_or(DepGitError::InvalidDelta("truncated size"))?;
        *pos += 1;
        if shift >= usize::BITS {
            return Err(DepGitError::InvalidDelta("size varint overflow"));
        }
        value |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

fn next_byte(delta: &[u8], pos: &mut usize) -> Result<usize, DepGitError> {
    let byte = *delta.get(*pos).ok_or(DepGitError::InvalidDelta("truncated copy"))?;
    *pos += 1;
    Ok(byte as usize)
}

/// Rebuilds an object from its base and a git delta instruction stream.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Bytes, DepGitError> {
    let mut pos = 0usize;
    let base_size = read_varint(delta, &mut pos)?;
    let result_size = read_varint(delta, &mut pos)?;
    if base_size != base.len() {
        return Err(DepGitError::InvalidDelta("base size mismatch"));
    }

    let mut out = Vec::with_capacity(result_size.min(MAX_PREALLOC));
    while pos < delta.len() {
        let opcode = delta[pos];
        pos += 1;

        if opcode & 0x80 != 0 {
            let mut offset = 0usize;
            let mut size = 0usize;
            for (bit, shift) in [(0x01, 0), (0x02, 8), (0x04, 16), (0x08, 24)] {
                if opcode & bit != 0 {
                    offset |= next_byte(delta, &mut pos)? << shift;
                }
            }
            for (bit, shift) in [(0x10, 0), (0x20, 8), (0x40, 16)] {
                if opcode & bit != 0 {
                    size |= next_byte(delta, &mut pos)? << shift;
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            let end = offset
                .checked_add(size)
                .filter(|end| *end <= base.len())
                .ok_or(DepGitError::InvalidDelta("copy out of range"))?;
            out.extend_from_slice(&base[offset..end]);
        } else if opcode != 0 {
            let end = pos + opcode as usize;
            if end > delta.len() {
                return Err(DepGitError::InvalidDelta("truncated insert"));
            }
            out.extend_from_slice(&delta[pos..end]);
            pos = end;
        } else {
            return Err(DepGitError::InvalidDelta("reserved opcode 0"));
        }

        if out.len() > result_size {
            return Err(DepGitError::InvalidDelta("result too long"));
        }
    }

    if out.len() != result_size {
        return Err(DepGitError::InvalidDelta("result size mismatch"));
    }
    Ok(Bytes::from(out))
}
