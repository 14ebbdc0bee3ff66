use chrono::{DateTime, Utc};
use russh::keys::ssh_key::PublicKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DepGitError;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SshKeyType {
    Rsa = 1,
    RsaSha2_256 = 2,
    RsaSha2_512 = 3,
    SshRsa = 4,
    EcdsaSha2Nistp256 = 5,
    Ed25519 = 6,
}

impl SshKeyType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(SshKeyType::Rsa),
            2 => Some(SshKeyType::RsaSha2_256),
            3 => Some(SshKeyType::RsaSha2_512),
            4 => Some(SshKeyType::SshRsa),
            5 => Some(SshKeyType::EcdsaSha2Nistp256),
            6 => Some(SshKeyType::Ed25519),
            _ => None,
        }
    }

    pub fn to_i64(self) -> i64 {
        self as i64
    }

    /// Maps an SSH algorithm name onto the stored key type.
    pub fn from_algorithm(name: &str) -> Option<Self> {
        match name {
            "ssh-rsa" => Some(SshKeyType::SshRsa),
            "rsa-sha2-256" => Some(SshKeyType::RsaSha2_256),
            "rsa-sha2-512" => Some(SshKeyType::RsaSha2_512),
            "ecdsa-sha2-nistp256" => Some(SshKeyType::EcdsaSha2Nistp256),
            "ssh-ed25519" => Some(SshKeyType::Ed25519),
            _ => None,
        }
    }
}

/// A public key registered to a user. `data` holds the SSH wire encoding of
/// the key, the same bytes an `authorized_keys` line carries in base64.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SshKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub key_type: SshKeyType,
    pub data: Vec<u8>,
    pub created: DateTime<Utc>,
    pub deleted: Option<DateTime<Utc>>,
}

impl SshKey {
    pub fn new(user_id: Uuid, name: impl Into<String>, key_type: SshKeyType, data: Vec<u8>) -> Self {
        SshKey {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            key_type,
            data,
            created: Utc::now(),
            deleted: None,
        }
    }

    /// Builds a key from an OpenSSH `authorized_keys` style line.
    pub fn from_openssh(user_id: Uuid, name: impl Into<String>, line: &str) -> Result<Self, DepGitError> {
        let key = PublicKey::from_openssh(line.trim())
            .map_err(|e| DepGitError::BadData(format!("invalid public key: {}", e)))?;
        let key_type = SshKeyType::from_algorithm(key.algorithm().as_str()).ok_or_else(|| {
            DepGitError::BadData(format!("unsupported key algorithm {}", key.algorithm()))
        })?;
        let data = key
            .to_bytes()
            .map_err(|e| DepGitError::BadData(format!("invalid public key: {}", e)))?;
        Ok(SshKey::new(user_id, name, key_type, data))
    }

    pub fn validate(&self) -> Result<(), DepGitError> {
        if self.id.is_nil() || self.user_id.is_nil() {
            return Err(DepGitError::BadData("ssh key id or owner is nil".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(DepGitError::BadData("ssh key name is empty".to_string()));
        }
        if self.data.is_empty() {
            return Err(DepGitError::BadData("ssh key data is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ED25519: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl user@host";

    #[test]
    fn test_from_openssh() {
        let owner = Uuid::new_v4();
        let key = SshKey::from_openssh(owner, "laptop", ED25519).unwrap();
        assert_eq!(key.key_type, SshKeyType::Ed25519);
        assert_eq!(key.user_id, owner);
        // string "ssh-ed25519" + 32 byte key, each length prefixed
        assert_eq!(key.data.len(), 4 + 11 + 4 + 32);
        assert!(key.validate().is_ok());
    }

    #[test]
    fn test_from_openssh_rejects_garbage() {
        assert!(matches!(
            SshKey::from_openssh(Uuid::new_v4(), "bad", "ssh-ed25519 not-base64"),
            Err(DepGitError::BadData(_))
        ));
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(SshKeyType::from_i64(5), Some(SshKeyType::EcdsaSha2Nistp256));
        assert_eq!(SshKeyType::from_i64(0), None);
        assert_eq!(SshKeyType::Rsa.to_i64(), 1);
        assert_eq!(SshKeyType::from_algorithm("ssh-rsa"), Some(SshKeyType::SshRsa));
    }

    #[test]
    fn test_validate() {
        let empty = SshKey::new(Uuid::new_v4(), "k", SshKeyType::Ed25519, vec![]);
        assert!(empty.validate().is_err());
        let unnamed = SshKey::new(Uuid::new_v4(), " ", SshKeyType::Ed25519, vec![1]);
        assert!(unnamed.validate().is_err());
    }
}
