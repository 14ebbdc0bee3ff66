use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::BranchPattern;
use crate::error::DepGitError;

/// Grants one user write access to the refs of one repository that match
/// `branch_pattern`. No pattern means every ref.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AccessRole {
    pub role_id: Uuid,
    pub user_id: Uuid,
    pub repo_id: Uuid,
    pub branch_pattern: Option<String>,
    pub created: DateTime<Utc>,
    pub deleted: Option<DateTime<Utc>>,
}

impl AccessRole {
    pub fn new(user_id: Uuid, repo_id: Uuid, branch_pattern: Option<&str>) -> Self {
        AccessRole {
            role_id: Uuid::new_v4(),
            user_id,
            repo_id,
            branch_pattern: branch_pattern.map(str::to_string),
            created: Utc::now(),
            deleted: None,
        }
    }

    pub fn pattern(&self) -> Result<BranchPattern, DepGitError> {
        BranchPattern::new(self.branch_pattern.as_deref())
    }

    pub fn validate(&self) -> Result<(), DepGitError> {
        if self.role_id.is_nil() || self.user_id.is_nil() || self.repo_id.is_nil() {
            return Err(DepGitError::BadData(
                "access role needs role, user and repo ids".to_string(),
            ));
        }
        self.pattern().map(|_| ())
    }
}
