use bstr::ByteSlice;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::error::DepGitError;
use crate::pkt_line::{self, PktLine};
use crate::transaction::{SessionState, Transaction, write_err_line};

impl Transaction {
    /// Lists refs and ends. Object transfer is not offered, so a `want`
    /// line is answered with `ERR`.
    pub(crate) async fn upload_pack<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<u32, DepGitError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.advertise_refs(writer).await?;
        let code = match pkt_line::read_pkt_line_opt(reader).await? {
            None | Some(PktLine::Flush) => {
                debug!(repo = %self.repo_name, "ref listing complete");
                0
            }
            Some(PktLine::Data(line)) if line.starts_with(b"want ") => {
                info!(repo = %self.repo_name, "fetch refused");
                write_err_line(writer, "fetching objects is not supported").await?;
                1
            }
            Some(PktLine::Data(line)) => {
                return Err(DepGitError::InvalidCommand(line.to_str_lossy().into_owned()));
            }
        };
        self.transition(SessionState::Closed)?;
        Ok(code)
    }
}
