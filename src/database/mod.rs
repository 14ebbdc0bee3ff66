use async_trait::async_trait;
use uuid::Uuid;

use crate::context::Context;
use crate::error::DepGitError;
use crate::model::{AccessRole, Repo, SshKey, User};

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteDatabase;

/// Records of users, their keys, repositories and access roles.
///
/// Every call checks `ctx` before touching storage. Lookups never return
/// soft-deleted rows; editing or deleting one is `NotFound`.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn create_user(&self, ctx: &Context, user: &User) -> Result<(), DepGitError>;
    async fn edit_user(&self, ctx: &Context, user: &User) -> Result<(), DepGitError>;
    async fn delete_user(&self, ctx: &Context, id: Uuid) -> Result<(), DepGitError>;
    async fn get_user(&self, ctx: &Context, id: Uuid) -> Result<User, DepGitError>;
    async fn list_users(&self, ctx: &Context) -> Result<Vec<User>, DepGitError>;

    async fn add_ssh_key(&self, ctx: &Context, key: &SshKey) -> Result<(), DepGitError>;
    async fn delete_ssh_key(&self, ctx: &Context, id: Uuid) -> Result<(), DepGitError>;
    async fn list_ssh_keys(&self, ctx: &Context, user_id: Uuid) -> Result<Vec<SshKey>, DepGitError>;
    /// Owner of the live key whose wire encoding equals `data`.
    async fn user_by_key(&self, ctx: &Context, data: &[u8]) -> Result<User, DepGitError>;

    async fn create_repo(&self, ctx: &Context, repo: &Repo) -> Result<(), DepGitError>;
    async fn edit_repo(&self, ctx: &Context, repo: &Repo) -> Result<(), DepGitError>;
    async fn delete_repo(&self, ctx: &Context, id: Uuid) -> Result<(), DepGitError>;
    async fn get_repo(&self, ctx: &Context, id: Uuid) -> Result<Repo, DepGitError>;
    async fn get_repo_by_name(&self, ctx: &Context, name: &str) -> Result<Repo, DepGitError>;
    async fn list_repos(&self, ctx: &Context) -> Result<Vec<Repo>, DepGitError>;

    async fn create_access_role(&self, ctx: &Context, role: &AccessRole) -> Result<(), DepGitError>;
    async fn edit_access_role(&self, ctx: &Context, role: &AccessRole) -> Result<(), DepGitError>;
    async fn delete_access_role(&self, ctx: &Context, role_id: Uuid) -> Result<(), DepGitError>;
    async fn get_access_role(&self, ctx: &Context, role_id: Uuid) -> Result<AccessRole, DepGitError>;
    async fn list_access_roles(&self, ctx: &Context, repo_id: Uuid) -> Result<Vec<AccessRole>, DepGitError>;
    /// Live roles of a live user on a live repository.
    async fn roles_for(
        &self,
        ctx: &Context,
        user_id: Uuid,
        repo_id: Uuid,
    ) -> Result<Vec<AccessRole>, DepGitError>;
}
