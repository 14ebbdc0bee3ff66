use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Context;
use crate::error::DepGitError;
use crate::sha::HashValue;

/// Ref storage for all repositories. Updates and deletes are
/// compare-and-swap on the old id, so concurrent pushes to one ref cannot
/// both win.
#[async_trait]
pub trait RefsManager: Send + Sync + 'static {
    async fn refs(&self, ctx: &Context, repo_id: Uuid) -> Result<Vec<RefItem>, DepGitError>;
    async fn get_ref(&self, ctx: &Context, repo_id: Uuid, name: &str) -> Result<RefItem, DepGitError>;
    /// Fails with `AlreadyExists` if the ref is present.
    async fn create_ref(
        &self,
        ctx: &Context,
        repo_id: Uuid,
        name: &str,
        value: HashValue,
    ) -> Result<(), DepGitError>;
    /// Fails with `StaleRef` if the stored value is not `old`.
    async fn update_ref(
        &self,
        ctx: &Context,
        repo_id: Uuid,
        name: &str,
        old: HashValue,
        new: HashValue,
    ) -> Result<(), DepGitError>;
    async fn delete_ref(
        &self,
        ctx: &Context,
        repo_id: Uuid,
        name: &str,
        old: HashValue,
    ) -> Result<(), DepGitError>;
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RefItem {
    pub name: String,
    pub value: HashValue,
}

impl RefItem {
    pub fn new(name: impl Into<String>, value: HashValue) -> Self {
        RefItem {
            name: name.into(),
            value,
        }
    }

    pub fn is_branch(&self) -> bool {
        self.name.starts_with("refs/heads/")
    }

    pub fn is_tag(&self) -> bool {
        self.name.starts_with("refs/tags/")
    }
}

/// Accepts names under `refs/` made of printable characters, with no empty
/// or dot-leading components and none of the characters git forbids.
pub fn is_valid_ref_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("refs/") else {
        return false;
    };
    if rest.is_empty() || name.ends_with('/') || name.ends_with(".lock") || name.contains("..") {
        return false;
    }
    if name.contains("@{") {
        return false;
    }
    if name
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
    {
        return false;
    }
    rest.split('/').all(|part| !part.is_empty() && !part.starts_with('.'))
}
