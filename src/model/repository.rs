use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DepGitError;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Repo {
    pub id: Uuid,
    pub name: String,
    pub created: DateTime<Utc>,
    pub edited: Option<DateTime<Utc>>,
    pub deleted: Option<DateTime<Utc>>,
}

impl Repo {
    pub fn new(name: impl Into<String>) -> Self {
        Repo {
            id: Uuid::new_v4(),
            name: name.into(),
            created: Utc::now(),
            edited: None,
            deleted: None,
        }
    }

    /// Storage namespace holding this repository's objects.
    pub fn namespace(&self) -> String {
        self.id.to_string()
    }

    pub fn validate(&self) -> Result<(), DepGitError> {
        if self.id.is_nil() {
            return Err(DepGitError::BadData("repo id is nil".to_string()));
        }
        if !is_valid_repo_name(&self.name) {
            return Err(DepGitError::BadData(format!(
                "invalid repo name {:?}",
                self.name
            )));
        }
        Ok(())
    }
}

pub fn is_valid_repo_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_names() {
        assert!(is_valid_repo_name("depgit"));
        assert!(is_valid_repo_name("my-repo_2.0"));
        assert!(!is_valid_repo_name(""));
        assert!(!is_valid_repo_name(".."));
        assert!(!is_valid_repo_name("a/b"));
        assert!(!is_valid_repo_name("a b"));
    }

    #[test]
    fn test_validate() {
        assert!(Repo::new("ok").validate().is_ok());
        let mut repo = Repo::new("ok");
        repo.id = Uuid::nil();
        assert!(repo.validate().is_err());
    }
}
