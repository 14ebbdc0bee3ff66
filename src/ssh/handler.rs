use std::collections::HashMap;
use std::net::SocketAddr;

use russh::keys::ssh_key::PublicKey;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId};
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::control::Control;
use crate::error::DepGitError;
use crate::model::User;
use crate::serve::AppCore;
use crate::transaction::{Transaction, TransactionService};

/// Per-connection state. `user` is set once a public key was accepted.
pub struct SshHandler {
    pub core: AppCore,
    pub control: Control,
    pub addr: Option<SocketAddr>,
    pub service_user: String,
    pub user: Option<User>,
    pub channels: HashMap<ChannelId, Channel<Msg>>,
}

impl SshHandler {
    pub fn new(core: AppCore, control: Control, addr: Option<SocketAddr>, service_user: String) -> Self {
        SshHandler {
            core,
            control,
            addr,
            service_user,
            user: None,
            channels: HashMap::new(),
        }
    }

    fn context(&self) -> Context {
        self.control.session_context()
    }
}

impl russh::server::Handler for SshHandler {
    type Error = DepGitError;

    async fn auth_publickey(&mut self, user: &str, public_key: &PublicKey) -> Result<Auth, Self::Error> {
        if user != self.service_user {
            warn!(peer = ?self.addr, user, "rejecting login for unexpected user");
            return Ok(Auth::reject());
        }
        let key = match public_key.to_bytes() {
            Ok(key) => key,
            Err(e) => {
                warn!(peer = ?self.addr, error = %e, "could not encode public key");
                return Ok(Auth::reject());
            }
        };
        match self.core.auth.resolve_user_by_public_key(&self.context(), &key).await {
            Ok(user) => {
                info!(peer = ?self.addr, user = %user.name, "public key accepted");
                self.user = Some(user);
                Ok(Auth::Accept)
            }
            Err(DepGitError::AuthenticationFailed) => {
                warn!(peer = ?self.addr, algorithm = %public_key.algorithm(), "unknown public key");
                Ok(Auth::reject())
            }
            Err(e) => {
                error!(peer = ?self.addr, error = %e, "public key lookup failed");
                Ok(Auth::reject())
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!(peer = ?self.addr, channel = ?channel.id(), "session channel opened");
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let (service, repo_name) = match TransactionService::parse_exec(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(peer = ?self.addr, error = %e, "unsupported exec request");
                let _ = session.channel_failure(channel);
                return Ok(());
            }
        };
        let (Some(user), Some(stream)) = (self.user.clone(), self.channels.remove(&channel)) else {
            let _ = session.channel_failure(channel);
            return Ok(());
        };
        info!(
            peer = ?self.addr,
            user = %user.name,
            repo = %repo_name,
            service = service.to_string(),
            "starting session"
        );
        let mut transaction = Transaction::new(self.core.clone(), self.context(), service, repo_name)
            .authenticated(user)?;
        let _ = session.channel_success(channel);

        let handle = session.handle();
        self.control.spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(stream.into_stream());
            let code = transaction.run(&mut reader, &mut writer).await;
            drop(reader);
            drop(writer);
            let _ = handle.exit_status_request(channel, code).await;
            let _ = handle.eof(channel).await;
            let _ = handle.close(channel).await;
        });
        Ok(())
    }

    async fn channel_close(&mut self, channel: ChannelId, _session: &mut Session) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }
}
