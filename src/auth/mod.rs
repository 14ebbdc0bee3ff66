use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::Context;
use crate::database::Database;
use crate::error::DepGitError;
use crate::model::User;

pub mod pattern;

pub use pattern::BranchPattern;

#[async_trait::async_trait]
pub trait Auth: Send + Sync + 'static {
    /// True iff a live role for (user, repo) has an empty pattern or one
    /// matching `branch`.
    async fn check_permission(
        &self,
        ctx: &Context,
        user_id: Uuid,
        repo_id: Uuid,
        branch: &str,
    ) -> Result<bool, DepGitError>;
    /// Fails with `AuthenticationFailed` when no live key matches.
    async fn resolve_user_by_public_key(&self, ctx: &Context, key: &[u8]) -> Result<User, DepGitError>;
    /// True iff the user holds any live role on the repository.
    async fn check_repo_access(&self, ctx: &Context, user_id: Uuid, repo_id: Uuid) -> Result<bool, DepGitError>;
}

#[derive(Clone)]
pub struct AccessControl {
    db: Arc<dyn Database>,
}

impl AccessControl {
    pub fn new(db: Arc<dyn Database>) -> Self {
        AccessControl { db }
    }
}

#[async_trait::async_trait]
impl Auth for AccessControl {
    async fn check_permission(
        &self,
        ctx: &Context,
        user_id: Uuid,
        repo_id: Uuid,
        branch: &str,
    ) -> Result<bool, DepGitError> {
        let roles = self.db.roles_for(ctx, user_id, repo_id).await?;
        for role in &roles {
            // a stored pattern that no longer compiles grants nothing
            match role.pattern() {
                Ok(pattern) if pattern.matches(branch) => {
                    debug!(role = %role.role_id, branch, "permission granted");
                    return Ok(true);
                }
                Ok(_) => {}
                Err(e) => warn!(role = %role.role_id, error = %e, "skipping role with bad pattern"),
            }
        }
        Ok(false)
    }

    async fn resolve_user_by_public_key(&self, ctx: &Context, key: &[u8]) -> Result<User, DepGitError> {
        match self.db.user_by_key(ctx, key).await {
            Ok(user) => Ok(user),
            Err(DepGitError::NotFound) => Err(DepGitError::AuthenticationFailed),
            Err(e) => Err(e),
        }
    }

    async fn check_repo_access(&self, ctx: &Context, user_id: Uuid, repo_id: Uuid) -> Result<bool, DepGitError> {
        Ok(!self.db.roles_for(ctx, user_id, repo_id).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteDatabase;
    use crate::model::{AccessRole, Repo, SshKey, SshKeyType};

    struct Fixture {
        db: Arc<SqliteDatabase>,
        auth: AccessControl,
        user: User,
        repo: Repo,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(SqliteDatabase::open_in_memory().unwrap());
        let ctx = Context::background();
        let user = User::new("user", "user@example.com");
        let repo = Repo::new("repo");
        db.create_user(&ctx, &user).await.unwrap();
        db.create_repo(&ctx, &repo).await.unwrap();
        Fixture {
            auth: AccessControl::new(db.clone()),
            db,
            user,
            repo,
        }
    }

    #[tokio::test]
    async fn test_no_role_denies() {
        let f = fixture().await;
        let ctx = Context::background();
        assert!(!f.auth.check_permission(&ctx, f.user.id, f.repo.id, "refs/heads/main").await.unwrap());
        assert!(!f.auth.check_repo_access(&ctx, f.user.id, f.repo.id).await.unwrap());
        assert!(!f.auth.check_permission(&ctx, Uuid::new_v4(), f.repo.id, "refs/heads/main").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_pattern() {
        let f = fixture().await;
        let ctx = Context::background();
        let role = AccessRole::new(f.user.id, f.repo.id, Some("refs/heads/release/*"));
        f.db.create_access_role(&ctx, &role).await.unwrap();

        assert!(f.auth.check_permission(&ctx, f.user.id, f.repo.id, "refs/heads/release/1.0").await.unwrap());
        assert!(!f.auth.check_permission(&ctx, f.user.id, f.repo.id, "refs/heads/main").await.unwrap());
        assert!(!f.auth.check_permission(&ctx, f.user.id, Uuid::new_v4(), "refs/heads/release/1.0").await.unwrap());
        assert!(f.auth.check_repo_access(&ctx, f.user.id, f.repo.id).await.unwrap());

        f.db.delete_access_role(&ctx, role.role_id).await.unwrap();
        assert!(!f.auth.check_permission(&ctx, f.user.id, f.repo.id, "refs/heads/release/1.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_pattern_matches_everything() {
        let f = fixture().await;
        let ctx = Context::background();
        let role = AccessRole::new(f.user.id, f.repo.id, None);
        f.db.create_access_role(&ctx, &role).await.unwrap();
        for branch in ["refs/heads/main", "refs/tags/v1", "refs/heads/a/b/c"] {
            assert!(f.auth.check_permission(&ctx, f.user.id, f.repo.id, branch).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_any_of_several_roles() {
        let f = fixture().await;
        let ctx = Context::background();
        for pattern in ["refs/heads/feature-?", "refs/tags/v[0-9]*"] {
            let role = AccessRole::new(f.user.id, f.repo.id, Some(pattern));
            f.db.create_access_role(&ctx, &role).await.unwrap();
        }
        assert!(f.auth.check_permission(&ctx, f.user.id, f.repo.id, "refs/heads/feature-x").await.unwrap());
        assert!(f.auth.check_permission(&ctx, f.user.id, f.repo.id, "refs/tags/v2.1").await.unwrap());
        assert!(!f.auth.check_permission(&ctx, f.user.id, f.repo.id, "refs/heads/feature-xy").await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_user_by_public_key() {
        let f = fixture().await;
        let ctx = Context::background();
        let key = SshKey::new(f.user.id, "laptop", SshKeyType::Ed25519, vec![7; 51]);
        f.db.add_ssh_key(&ctx, &key).await.unwrap();

        let found = f.auth.resolve_user_by_public_key(&ctx, &[7; 51]).await.unwrap();
        assert_eq!(found.id, f.user.id);
        assert!(matches!(
            f.auth.resolve_user_by_public_key(&ctx, &[8; 51]).await,
            Err(DepGitError::AuthenticationFailed)
        ));

        ctx.cancel();
        assert!(matches!(
            f.auth.resolve_user_by_public_key(&ctx, &[7; 51]).await,
            Err(DepGitError::Cancelled)
        ));
    }
}
