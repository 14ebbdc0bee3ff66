use std::env::var;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::database::DatabaseConfig;
use crate::config::ssh::SshConfig;
use crate::config::storage::StorageConfig;
use crate::error::DepGitError;

pub mod database;
pub mod ssh;
pub mod storage;

pub const ENV_CONFIG_FILE: &str = "CONFIG_FILE";
pub const ENV_SSH_ADDRESS: &str = "DEPGIT_SSH_GIT_ADDRESS";
pub const ENV_SSH_HOSTKEY: &str = "DEPGIT_SSH_GIT_HOSTKEY";
pub const ENV_DB_PATH: &str = "DEPGIT_DB_PATH";
pub const ENV_STORAGE_PATH: &str = "DEPGIT_STORAGE_PATH";

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct AppConfig {
    pub ssh: SshConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    /// Time in-flight sessions get after shutdown before they are dropped.
    pub shutdown_grace_secs: u64,
    /// Interval of task metric logging. 0 disables it.
    pub metrics_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 30,
            metrics_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn config_file_path() -> String {
    var(ENV_CONFIG_FILE).unwrap_or("config.toml".to_string())
}

impl AppConfig {
    /// Reads the file named by `CONFIG_FILE` (default `config.toml`), writing
    /// the defaults there if it does not exist, then applies environment
    /// overrides.
    pub fn load() -> Result<Self, DepGitError> {
        let path = config_file_path();
        let mut cfg = Self::load_from(&path)?;
        cfg.apply_env(|key| var(key).ok())?;
        Ok(cfg)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, DepGitError> {
        let path = path.as_ref();
        if !path.exists() {
            let cfg = AppConfig::default();
            cfg.save_to(path)?;
            info!(path = %path.display(), "wrote default config");
            return Ok(cfg);
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| DepGitError::Config(format!("could not parse {}: {}", path.display(), e)))
    }

    pub fn save(&self) -> Result<(), DepGitError> {
        self.save_to(config_file_path())
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), DepGitError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| DepGitError::Config(format!("could not serialize config: {}", e)))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), DepGitError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ENV_SSH_ADDRESS) {
            self.ssh.set_address(&address).map_err(DepGitError::Config)?;
        }
        if let Some(host_key) = lookup(ENV_SSH_HOSTKEY) {
            self.ssh.host_key = Some(host_key);
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database.path = path;
        }
        if let Some(path) = lookup(ENV_STORAGE_PATH) {
            self.storage.path = path;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::storage::StorageBackend;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.ssh.user, "git");
        assert!(path.exists());
        let again = AppConfig::load_from(&path).unwrap();
        assert_eq!(again.database.path, cfg.database.path);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[ssh]\nport = 2022\n\n[storage]\nbackend = \"memory\"\n",
        )
        .unwrap();
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.ssh.port, 2022);
        assert_eq!(cfg.ssh.host, "0.0.0.0");
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.server.shutdown_grace_secs, 30);
    }

    #[test]
    fn test_unparsable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ssh\nport = ").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(DepGitError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_SSH_ADDRESS, "127.0.0.1:2200"),
            (ENV_SSH_HOSTKEY, "/etc/depgit/host_ed25519"),
            (ENV_DB_PATH, "/var/lib/depgit/db.sqlite"),
            (ENV_STORAGE_PATH, "/var/lib/depgit/objects"),
        ]);
        let mut cfg = AppConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.ssh.address(), "127.0.0.1:2200");
        assert_eq!(cfg.ssh.host_key.as_deref(), Some("/etc/depgit/host_ed25519"));
        assert_eq!(cfg.database.path, "/var/lib/depgit/db.sqlite");
        assert_eq!(cfg.storage.path, "/var/lib/depgit/objects");

        let mut bad = AppConfig::default();
        assert!(bad.apply_env(|_| Some("host:port".to_string())).is_err());
    }
}
