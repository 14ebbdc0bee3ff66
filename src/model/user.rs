use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DepGitError;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created: DateTime<Utc>,
    pub edited: Option<DateTime<Utc>>,
    pub deleted: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            created: Utc::now(),
            edited: None,
            deleted: None,
        }
    }

    pub fn validate(&self) -> Result<(), DepGitError> {
        if self.id.is_nil() {
            return Err(DepGitError::BadData("user id is nil".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(DepGitError::BadData("user name is empty".to_string()));
        }
        if !self.email.contains('@') {
            return Err(DepGitError::BadData(format!(
                "invalid email {:?}",
                self.email
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(User::new("alice", "alice@example.com").validate().is_ok());
        assert!(User::new("", "alice@example.com").validate().is_err());
        assert!(User::new("alice", "alice.example.com").validate().is_err());
        let mut nil = User::new("alice", "alice@example.com");
        nil.id = Uuid::nil();
        assert!(matches!(nil.validate(), Err(DepGitError::BadData(_))));
    }
}
