use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::capability::GitCapability;
use crate::error::DepGitError;
use crate::pkt_line::{encode_flush, encode_into};
use crate::sha::HashValue;
use crate::transaction::{SessionState, Transaction, TransactionService};

/// Placeholder ref name advertised by an empty repository.
pub const EMPTY_REPO_REF: &str = "capabilities^{}";

impl Transaction {
    /// Looks up the repository, gates upload-pack on repository access and
    /// writes the ref advertisement terminated by a flush.
    pub async fn advertise_refs<W>(&mut self, writer: &mut W) -> Result<(), DepGitError>
    where
        W: AsyncWrite + Unpin,
    {
        self.expect_state(SessionState::AdvertiseRefs)?;
        let user_id = self.require_user()?.id;
        let repo = self
            .core
            .database
            .get_repo_by_name(&self.ctx, &self.repo_name)
            .await?;

        let capabilities = match self.service {
            TransactionService::ReceivePack => GitCapability::receive(),
            TransactionService::UploadPack => {
                if !self.core.auth.check_repo_access(&self.ctx, user_id, repo.id).await? {
                    return Err(DepGitError::PermissionDenied);
                }
                GitCapability::upload()
            }
        };
        self.refs = self.core.refs.refs(&self.ctx, repo.id).await?;
        self.repository = Some(repo);

        let buf = self.encode_advertisement(&capabilities)?;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        debug!(repo = %self.repo_name, refs = self.refs.len(), "refs advertised");
        Ok(())
    }

    fn encode_advertisement(&self, capabilities: &[GitCapability]) -> Result<BytesMut, DepGitError> {
        let caps = GitCapability::join(capabilities);
        let mut buf = BytesMut::new();
        match self.refs.split_first() {
            None => {
                let line = format!("{} {}\0{}\n", HashValue::zero(), EMPTY_REPO_REF, caps);
                encode_into(&mut buf, line.as_bytes())?;
            }
            Some((first, rest)) => {
                let line = format!("{} {}\0{}\n", first.value, first.name, caps);
                encode_into(&mut buf, line.as_bytes())?;
                for item in rest {
                    encode_into(&mut buf, format!("{} {}\n", item.value, item.name).as_bytes())?;
                }
            }
        }
        buf.extend_from_slice(&encode_flush());
        Ok(buf)
    }
}
