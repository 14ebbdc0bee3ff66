use tokio::io::{AsyncRead, AsyncWrite};
use tokio_stream::StreamExt;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{DepGitError, ErrorClass};
use crate::model::Repo;
use crate::objects::EncodedObject;
use crate::pack::decode_pack;
use crate::pkt_line::{self, PktLine};
use crate::refs::is_valid_ref_name;
use crate::transaction::receive::command::ReceiveCommand;
use crate::transaction::{SessionState, Transaction};

pub mod command;

/// Drains the whole pack before handing anything out, so a failure part way
/// through leaves nothing to persist. Every object stays in memory until the
/// session ends.
async fn collect_pack<R>(reader: &mut R) -> Result<Vec<EncodedObject>, DepGitError>
where
    R: AsyncRead + Unpin,
{
    let stream = decode_pack(reader);
    tokio::pin!(stream);
    let mut objects = Vec::new();
    while let Some(object) = stream.next().await {
        let object = object?;
        trace!(id = %object.id, kind = %object.object_type, size = object.size, "object decoded");
        objects.push(object);
    }
    Ok(objects)
}

impl Transaction {
    pub(crate) async fn receive_pack<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<u32, DepGitError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.advertise_refs(writer).await?;
        self.transition(SessionState::AwaitCommands)?;
        if !self.await_commands(reader).await? {
            debug!(repo = %self.repo_name, "client hung up after advertisement");
            return Ok(0);
        }
        if self.commands.is_empty() {
            self.transition(SessionState::ReportStatus)?;
        } else if self.commands.iter().any(|c| !c.is_delete()) {
            self.receive_packfile(reader).await?;
        }
        if self.state() != SessionState::ReportStatus {
            self.authorize_and_persist().await?;
        }
        self.report_status(writer).await
    }

    /// Reads command lines up to the flush. Returns false if the client
    /// closed the stream before sending anything.
    pub async fn await_commands<R>(&mut self, reader: &mut R) -> Result<bool, DepGitError>
    where
        R: AsyncRead + Unpin,
    {
        self.expect_state(SessionState::AwaitCommands)?;
        loop {
            let line = match pkt_line::read_pkt_line_opt(reader).await? {
                None if self.commands.is_empty() => return Ok(false),
                None => return Err(DepGitError::UnexpectedEof),
                Some(PktLine::Flush) => break,
                Some(PktLine::Data(line)) => line,
            };
            let (command, capabilities) = ReceiveCommand::parse(&line)?;
            if self.commands.is_empty() {
                if let Some(capabilities) = capabilities {
                    self.capabilities = capabilities;
                }
            }
            trace!(old = %command.old, new = %command.new, r#ref = %command.ref_name, "command received");
            self.commands.push(command);
        }
        debug!(repo = %self.repo_name, commands = self.commands.len(), "command block complete");
        Ok(true)
    }

    /// Decodes the packfile following the commands. A decode failure is
    /// recorded in the report and moves straight to `ReportStatus`.
    pub async fn receive_packfile<R>(&mut self, reader: &mut R) -> Result<(), DepGitError>
    where
        R: AsyncRead + Unpin,
    {
        self.transition(SessionState::ReceivePackfile)?;
        match collect_pack(reader).await {
            Ok(objects) => {
                info!(repo = %self.repo_name, objects = objects.len(), "packfile received");
                self.objects = objects;
                Ok(())
            }
            Err(e) if matches!(e.class(), ErrorClass::Decode | ErrorClass::Framing) => {
                warn!(repo = %self.repo_name, error = %e, "unpack failed");
                self.report.unpack_error(e.to_string());
                for command in &self.commands {
                    self.report.ng(&command.ref_name, "unpacker error");
                }
                self.transition(SessionState::ReportStatus)
            }
            Err(e) => Err(e),
        }
    }

    /// Checks and applies every command on its own; a rejected ref never
    /// blocks its siblings.
    pub async fn authorize_and_persist(&mut self) -> Result<(), DepGitError> {
        self.transition(SessionState::AuthorizeAndPersist)?;
        let user_id = self.require_user()?.id;
        let repo = self.require_repo()?.clone();
        let commands = self.commands.clone();
        for command in &commands {
            match self.apply_command(user_id, &repo, command).await {
                Ok(()) => {
                    info!(repo = %repo.name, r#ref = %command.ref_name, new = %command.new, "ref updated");
                    self.report.ok(&command.ref_name);
                }
                Err(reason) => {
                    info!(repo = %repo.name, r#ref = %command.ref_name, %reason, "ref rejected");
                    self.report.ng(&command.ref_name, reason);
                }
            }
        }
        self.transition(SessionState::ReportStatus)
    }

    async fn apply_command(&mut self, user_id: Uuid, repo: &Repo, command: &ReceiveCommand) -> Result<(), String> {
        if !is_valid_ref_name(&command.ref_name) {
            return Err("invalid ref name".to_string());
        }
        match self
            .core
            .auth
            .check_permission(&self.ctx, user_id, repo.id, &command.ref_name)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Err("permission denied".to_string()),
            Err(e) => return Err(format!("permission check failed: {}", e)),
        }
        if !command.is_delete() {
            self.persist_objects(repo)
                .await
                .map_err(|e| format!("storage error: {}", e))?;
        }

        let refs = &self.core.refs;
        let result = if command.is_delete() {
            refs.delete_ref(&self.ctx, repo.id, &command.ref_name, command.old).await
        } else if command.is_create() {
            refs.create_ref(&self.ctx, repo.id, &command.ref_name, command.new).await
        } else {
            refs.update_ref(&self.ctx, repo.id, &command.ref_name, command.old, command.new)
                .await
        };
        result.map_err(|e| match e {
            DepGitError::AlreadyExists => "already exists".to_string(),
            DepGitError::StaleRef | DepGitError::NotFound => "stale old value".to_string(),
            other => format!("ref update failed: {}", other),
        })
    }

    /// Stores every decoded object once per session.
    async fn persist_objects(&mut self, repo: &Repo) -> Result<(), DepGitError> {
        if self.persisted {
            return Ok(());
        }
        let mut written = 0;
        for object in &self.objects {
            if self.core.store_object(&self.ctx, repo, object).await? {
                written += 1;
            }
        }
        self.persisted = true;
        debug!(repo = %repo.name, objects = self.objects.len(), written, "objects persisted");
        Ok(())
    }
}
