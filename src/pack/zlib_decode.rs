use bytes::Bytes;
use flate2::{Decompress, FlushDecompress, Status};
use tokio::io::AsyncRead;

use crate::error::DepGitError;
use crate::pack::PackReader;

const INFLATE_CHUNK: usize = 8192;
// Declared sizes come from the client; don't trust them for preallocation.
const MAX_PREALLOC: usize = 1 << 20;

impl<R> PackReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Inflates one zlib stream and leaves any following bytes buffered.
    ///
    /// The inflated length must equal `expected`.
    pub(crate) async fn inflate(&mut self, expected: u64) -> Result<Bytes, DepGitError> {
        let mut decomp = Decompress::new(true);
        let mut object_data = Vec::with_capacity((expected as usize).min(MAX_PREALLOC));
        let mut tmp_out = vec![0u8; INFLATE_CHUNK];

        loop {
            if self.buffer.is_empty() {
                self.fill_more().await?;
            }

            let before_in = decomp.total_in();
            let before_out = decomp.total_out();
            let status = decomp
                .decompress(&self.buffer, &mut tmp_out, FlushDecompress::None)
                .map_err(|e| DepGitError::DecompressionError(e.to_string()))?;
            let consumed_in = (decomp.total_in() - before_in) as usize;
            let produced_out = (decomp.total_out() - before_out) as usize;

            if consumed_in > 0 {
                self.consume(consumed_in);
            }
            object_data.extend_from_slice(&tmp_out[..produced_out]);
            if object_data.len() as u64 > expected {
                return Err(DepGitError::SizeMismatch {
                    declared: expected,
                    actual: object_data.len() as u64,
                });
            }

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if consumed_in == 0 && produced_out == 0 {
                        self.fill_more().await?;
                    }
                }
            }
        }

        if object_data.len() as u64 != expected {
            return Err(DepGitError::SizeMismatch {
                declared: expected,
                actual: object_data.len() as u64,
            });
        }
        Ok(Bytes::from(object_data))
    }
}
