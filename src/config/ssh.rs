use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    /// Service account every client must log in as.
    pub user: String,
    /// Path of the host private key in OpenSSH format. Required to serve.
    pub host_key: Option<String>,
    pub inactivity_timeout_secs: u64,
    pub auth_rejection_millis: u64,
}

impl SshConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn inactivity_timeout(&self) -> Option<Duration> {
        match self.inactivity_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn auth_rejection_time(&self) -> Duration {
        Duration::from_millis(self.auth_rejection_millis)
    }

    /// Applies a `host:port` override; a value without a port keeps the
    /// configured one.
    pub(crate) fn set_address(&mut self, address: &str) -> Result<(), String> {
        match address.rsplit_once(':') {
            Some((host, port)) => {
                self.port = port
                    .parse()
                    .map_err(|_| format!("invalid port in ssh address {:?}", address))?;
                self.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
            }
            None => self.host = address.to_string(),
        }
        Ok(())
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2222,
            user: "git".to_string(),
            host_key: None,
            inactivity_timeout_secs: 300,
            auth_rejection_millis: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_address() {
        let mut cfg = SshConfig::default();
        cfg.set_address("127.0.0.1:2022").unwrap();
        assert_eq!(cfg.address(), "127.0.0.1:2022");
        cfg.set_address("[::1]:22").unwrap();
        assert_eq!(cfg.host, "::1");
        assert_eq!(cfg.port, 22);
        assert!(cfg.set_address("localhost:ssh").is_err());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let cfg = SshConfig {
            inactivity_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.inactivity_timeout(), None);
    }
}
