use bstr::ByteSlice;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use crate::capability::GitCapability;
use crate::context::Context;
use crate::error::{DepGitError, ErrorClass};
use crate::model::{Repo, User, is_valid_repo_name};
use crate::objects::EncodedObject;
use crate::pkt_line;
use crate::refs::RefItem;
use crate::serve::AppCore;
use crate::transaction::receive::command::ReceiveCommand;
use crate::transaction::report_status::ReportStatus;

pub mod advertise;
pub mod receive;
pub mod report_status;
pub mod upload;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionService {
    #[serde(rename = "git-upload-pack")]
    UploadPack,
    #[serde(rename = "git-receive-pack")]
    ReceivePack,
}

impl TransactionService {
    pub fn from_string(s: &str) -> Option<TransactionService> {
        match s {
            "git-upload-pack" => Some(TransactionService::UploadPack),
            "git-receive-pack" => Some(TransactionService::ReceivePack),
            _ => None,
        }
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            TransactionService::UploadPack => "git-upload-pack",
            TransactionService::ReceivePack => "git-receive-pack",
        }
    }

    /// Splits an SSH exec line such as `git-receive-pack '/project.git'` into
    /// the service and the repository name.
    pub fn parse_exec(data: &[u8]) -> Result<(TransactionService, String), DepGitError> {
        let line = data
            .to_str()
            .map_err(|_| DepGitError::UnsupportedService(data.to_str_lossy().into_owned()))?
            .trim();
        let (command, path) = line
            .split_once(' ')
            .ok_or_else(|| DepGitError::UnsupportedService(line.to_string()))?;
        let service = TransactionService::from_string(command)
            .ok_or_else(|| DepGitError::UnsupportedService(command.to_string()))?;
        let path = path.trim();
        let path = path
            .strip_prefix('\'')
            .and_then(|p| p.strip_suffix('\''))
            .or_else(|| path.strip_prefix('"').and_then(|p| p.strip_suffix('"')))
            .unwrap_or(path);
        let name = path.trim_start_matches('/').trim_end_matches('/');
        let name = name.strip_suffix(".git").unwrap_or(name);
        if !is_valid_repo_name(name) {
            return Err(DepGitError::InvalidCommand(format!("invalid repository path {:?}", path)));
        }
        Ok((service, name.to_string()))
    }
}

/// Phase of one protocol session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Authenticating,
    AdvertiseRefs,
    AwaitCommands,
    ReceivePackfile,
    AuthorizeAndPersist,
    ReportStatus,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Authenticating, AdvertiseRefs)
                | (AdvertiseRefs, AwaitCommands)
                | (AwaitCommands, ReceivePackfile)
                // delete-only pushes carry no pack
                | (AwaitCommands, AuthorizeAndPersist)
                // nothing to push
                | (AwaitCommands, ReportStatus)
                | (ReceivePackfile, AuthorizeAndPersist)
                | (ReceivePackfile, ReportStatus)
                | (AuthorizeAndPersist, ReportStatus)
        ) || (to == Closed && self != Closed)
    }
}

/// One `git-receive-pack` or `git-upload-pack` exchange over a byte stream.
pub struct Transaction {
    pub(crate) core: AppCore,
    pub(crate) ctx: Context,
    pub service: TransactionService,
    pub repo_name: String,
    state: SessionState,
    pub(crate) user: Option<User>,
    pub(crate) repository: Option<Repo>,
    pub(crate) refs: Vec<RefItem>,
    pub(crate) capabilities: Vec<GitCapability>,
    pub(crate) commands: Vec<ReceiveCommand>,
    pub(crate) objects: Vec<EncodedObject>,
    pub(crate) report: ReportStatus,
    pub(crate) persisted: bool,
}

impl Transaction {
    pub fn new(core: AppCore, ctx: Context, service: TransactionService, repo_name: impl Into<String>) -> Self {
        Transaction {
            core,
            ctx,
            service,
            repo_name: repo_name.into(),
            state: SessionState::Authenticating,
            user: None,
            repository: None,
            refs: Vec::new(),
            capabilities: Vec::new(),
            commands: Vec::new(),
            objects: Vec::new(),
            report: ReportStatus::new(),
            persisted: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn commands(&self) -> &[ReceiveCommand] {
        &self.commands
    }

    pub fn objects(&self) -> &[EncodedObject] {
        &self.objects
    }

    pub fn report(&self) -> &ReportStatus {
        &self.report
    }

    pub(crate) fn transition(&mut self, to: SessionState) -> Result<(), DepGitError> {
        if !self.state.can_transition_to(to) {
            return Err(DepGitError::IllegalTransition { from: self.state, to });
        }
        trace!(from = ?self.state, to = ?to, "session state");
        self.state = to;
        Ok(())
    }

    pub(crate) fn expect_state(&self, state: SessionState) -> Result<(), DepGitError> {
        if self.state != state {
            return Err(DepGitError::IllegalTransition {
                from: self.state,
                to: state,
            });
        }
        Ok(())
    }

    /// Enters the session with a user already resolved by the transport.
    pub fn authenticated(mut self, user: User) -> Result<Self, DepGitError> {
        self.transition(SessionState::AdvertiseRefs)?;
        self.user = Some(user);
        Ok(self)
    }

    /// Resolves the presented public key. An unknown key closes the session
    /// without writing anything.
    pub async fn authenticate(&mut self, key: &[u8]) -> Result<(), DepGitError> {
        self.expect_state(SessionState::Authenticating)?;
        match self.core.auth.resolve_user_by_public_key(&self.ctx, key).await {
            Ok(user) => {
                self.transition(SessionState::AdvertiseRefs)?;
                self.user = Some(user);
                Ok(())
            }
            Err(e) => {
                warn!(repo = %self.repo_name, error = %e, "public key rejected");
                self.state = SessionState::Closed;
                Err(DepGitError::AuthenticationFailed)
            }
        }
    }

    pub(crate) fn require_user(&self) -> Result<&User, DepGitError> {
        self.user.as_ref().ok_or(DepGitError::AuthenticationFailed)
    }

    pub(crate) fn require_repo(&self) -> Result<&Repo, DepGitError> {
        self.repository.as_ref().ok_or(DepGitError::NotFound)
    }

    pub(crate) fn has_capability(&self, capability: &GitCapability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Drives the session to `Closed` and returns the process exit status:
    /// 0 when everything succeeded, 1 otherwise.
    pub async fn run<R, W>(&mut self, reader: &mut R, writer: &mut W) -> u32
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = match self.service {
            TransactionService::ReceivePack => self.receive_pack(reader, writer).await,
            TransactionService::UploadPack => self.upload_pack(reader, writer).await,
        };
        let code = match result {
            Ok(code) => code,
            Err(e) => {
                let class = e.class();
                match class {
                    ErrorClass::Internal | ErrorClass::Storage => {
                        tracing::error!(repo = %self.repo_name, state = ?self.state, ?class, error = %e, "session failed")
                    }
                    _ => warn!(repo = %self.repo_name, state = ?self.state, ?class, error = %e, "session aborted"),
                }
                if let Err(write_err) = self.fail(writer, &e).await {
                    debug!(error = %write_err, "could not send final frame");
                }
                1
            }
        };
        if let Err(e) = writer.flush().await {
            debug!(error = %e, "flush on close failed");
        }
        self.state = SessionState::Closed;
        info!(repo = %self.repo_name, service = self.service.to_string(), code, "session closed");
        code
    }

    /// Best-effort terminal frame so the client does not hang on a read.
    async fn fail<W>(&mut self, writer: &mut W, error: &DepGitError) -> Result<(), DepGitError>
    where
        W: AsyncWrite + Unpin,
    {
        match (self.state, self.service) {
            (SessionState::Authenticating | SessionState::Closed, _) => Ok(()),
            (SessionState::AdvertiseRefs, _) | (_, TransactionService::UploadPack) => {
                let msg = match error {
                    DepGitError::NotFound => format!("repository '{}' not found", self.repo_name),
                    DepGitError::PermissionDenied => {
                        format!("access denied to repository '{}'", self.repo_name)
                    }
                    other => other.to_string(),
                };
                write_err_line(writer, &msg).await
            }
            _ => {
                let mut report = ReportStatus::new();
                report.unpack_error(error.to_string());
                for command in &self.commands {
                    report.ng(&command.ref_name, error.to_string());
                }
                self.report = report;
                self.write_report(writer).await
            }
        }
    }
}

pub(crate) async fn write_err_line<W>(writer: &mut W, msg: &str) -> Result<(), DepGitError>
where
    W: AsyncWrite + Unpin,
{
    let line: Bytes = pkt_line::encode(format!("ERR {}\n", msg).as_bytes())?;
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
