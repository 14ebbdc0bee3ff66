use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ssh::SshConfig;
use crate::control::Control;
use crate::error::DepGitError;
use crate::serve::AppCore;
use crate::ssh::handler::SshHandler;

pub mod handler;

pub struct SshServer {
    pub core: AppCore,
    pub config: SshConfig,
    pub control: Control,
}

impl SshServer {
    pub fn new(core: AppCore, config: SshConfig, control: Control) -> Self {
        SshServer { core, config, control }
    }

    fn russh_config(&self) -> Result<russh::server::Config, DepGitError> {
        let path = self
            .config
            .host_key
            .as_deref()
            .ok_or_else(|| DepGitError::Config("ssh.host_key is not set".to_string()))?;
        let key = russh::keys::load_secret_key(path, None)
            .map_err(|e| DepGitError::Config(format!("could not load host key {}: {}", path, e)))?;
        Ok(russh::server::Config {
            inactivity_timeout: self.config.inactivity_timeout(),
            auth_rejection_time: self.config.auth_rejection_time(),
            auth_rejection_time_initial: Some(std::time::Duration::ZERO),
            keys: vec![key],
            ..Default::default()
        })
    }

    /// Accepts connections until shutdown is signalled. Every connection is
    /// a tracked task, so `Control::shutdown` bounds its remaining lifetime.
    pub async fn run(&mut self) -> Result<(), DepGitError> {
        let config = Arc::new(self.russh_config()?);
        let listener = TcpListener::bind(self.config.address()).await?;
        info!(address = %self.config.address(), "ssh server listening");
        let shutdown = self.control.shutdown_token();
        loop {
            let (socket, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };
            let _ = socket.set_nodelay(true);
            let handler = russh::server::Server::new_client(self, Some(peer));
            let config = config.clone();
            self.control.spawn(async move {
                match russh::server::run_stream(config, socket, handler).await {
                    Ok(session) => {
                        if let Err(e) = session.await {
                            debug!(%peer, error = %e, "ssh connection ended with error");
                        }
                    }
                    Err(e) => warn!(%peer, error = %e, "ssh handshake failed"),
                }
            });
        }
        info!("ssh server stopped accepting connections");
        Ok(())
    }
}

impl russh::server::Server for SshServer {
    type Handler = SshHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        SshHandler::new(
            self.core.clone(),
            self.control.clone(),
            peer_addr,
            self.config.user.clone(),
        )
    }
}
