use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tracing::debug;
use uuid::Uuid;

use super::Database;
use super::schema::SCHEMA;
use crate::context::Context;
use crate::error::DepGitError;
use crate::model::{AccessRole, Repo, SshKey, SshKeyType, User};
use crate::refs::{RefItem, RefsManager};
use crate::sha::HashValue;

const USER_COLUMNS: &str = "id, name, email, created, edited, deleted";
const KEY_COLUMNS: &str = "id, user_id, name, key_type, data, created, deleted";
const REPO_COLUMNS: &str = "id, name, created, edited, deleted";
const ROLE_COLUMNS: &str = "role_id, user_id, repo_id, branch_pattern, created, deleted";

/// Single-connection SQLite store. The connection mutex serializes writes.
pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DepGitError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, DepGitError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DepGitError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs an UPDATE that must hit exactly one live row.
    fn update_one(&self, sql: &str, params: impl rusqlite::Params) -> Result<(), DepGitError> {
        let changed = self.conn().execute(sql, params)?;
        if changed == 0 {
            return Err(DepGitError::NotFound);
        }
        Ok(())
    }

    fn ensure_live(&self, table: &str, id: Uuid) -> Result<(), DepGitError> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1 AND deleted IS NULL", table);
        let found: Option<i64> = self
            .conn()
            .query_row(&sql, params![id.to_string()], |row| row.get(0))
            .optional()?;
        found.map(|_| ()).ok_or(DepGitError::NotFound)
    }
}

fn write_error(e: rusqlite::Error) -> DepGitError {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                DepGitError::NotFound
            } else {
                DepGitError::AlreadyExists
            }
        }
        other => DepGitError::Database(other),
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => time_at(row, idx).map(Some),
    }
}

fn hash_at(row: &Row, idx: usize) -> rusqlite::Result<HashValue> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: DepGitError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created: time_at(row, 3)?,
        edited: opt_time_at(row, 4)?,
        deleted: opt_time_at(row, 5)?,
    })
}

fn key_from_row(row: &Row) -> rusqlite::Result<SshKey> {
    let code: i64 = row.get(3)?;
    let key_type = SshKeyType::from_i64(code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, format!("unknown key type {}", code).into())
    })?;
    Ok(SshKey {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        name: row.get(2)?,
        key_type,
        data: row.get(4)?,
        created: time_at(row, 5)?,
        deleted: opt_time_at(row, 6)?,
    })
}

fn repo_from_row(row: &Row) -> rusqlite::Result<Repo> {
    Ok(Repo {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        created: time_at(row, 2)?,
        edited: opt_time_at(row, 3)?,
        deleted: opt_time_at(row, 4)?,
    })
}

fn role_from_row(row: &Row) -> rusqlite::Result<AccessRole> {
    Ok(AccessRole {
        role_id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        repo_id: uuid_at(row, 2)?,
        branch_pattern: row.get(3)?,
        created: time_at(row, 4)?,
        deleted: opt_time_at(row, 5)?,
    })
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn create_user(&self, ctx: &Context, user: &User) -> Result<(), DepGitError> {
        ctx.check()?;
        user.validate()?;
        self.conn()
            .execute(
                "INSERT INTO users (id, name, email, created, edited, deleted)
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL)",
                params![
                    user.id.to_string(),
                    user.name,
                    user.email,
                    format_datetime(&user.created),
                ],
            )
            .map_err(write_error)?;
        debug!(user = %user.id, "user created");
        Ok(())
    }

    async fn edit_user(&self, ctx: &Context, user: &User) -> Result<(), DepGitError> {
        ctx.check()?;
        user.validate()?;
        self.update_one(
            "UPDATE users SET name = ?2, email = ?3, edited = ?4 WHERE id = ?1 AND deleted IS NULL",
            params![
                user.id.to_string(),
                user.name,
                user.email,
                format_datetime(&Utc::now()),
            ],
        )
    }

    async fn delete_user(&self, ctx: &Context, id: Uuid) -> Result<(), DepGitError> {
        ctx.check()?;
        self.update_one(
            "UPDATE users SET deleted = ?2 WHERE id = ?1 AND deleted IS NULL",
            params![id.to_string(), format_datetime(&Utc::now())],
        )
    }

    async fn get_user(&self, ctx: &Context, id: Uuid) -> Result<User, DepGitError> {
        ctx.check()?;
        let sql = format!("SELECT {} FROM users WHERE id = ?1 AND deleted IS NULL", USER_COLUMNS);
        self.conn()
            .query_row(&sql, params![id.to_string()], user_from_row)
            .optional()?
            .ok_or(DepGitError::NotFound)
    }

    async fn list_users(&self, ctx: &Context) -> Result<Vec<User>, DepGitError> {
        ctx.check()?;
        let sql = format!(
            "SELECT {} FROM users WHERE deleted IS NULL ORDER BY name, id",
            USER_COLUMNS
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    async fn add_ssh_key(&self, ctx: &Context, key: &SshKey) -> Result<(), DepGitError> {
        ctx.check()?;
        key.validate()?;
        self.ensure_live("users", key.user_id)?;
        self.conn()
            .execute(
                "INSERT INTO ssh_keys (id, user_id, name, key_type, data, created, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
                params![
                    key.id.to_string(),
                    key.user_id.to_string(),
                    key.name,
                    key.key_type.to_i64(),
                    key.data,
                    format_datetime(&key.created),
                ],
            )
            .map_err(write_error)?;
        debug!(key = %key.id, user = %key.user_id, "ssh key added");
        Ok(())
    }

    async fn delete_ssh_key(&self, ctx: &Context, id: Uuid) -> Result<(), DepGitError> {
        ctx.check()?;
        self.update_one(
            "UPDATE ssh_keys SET deleted = ?2 WHERE id = ?1 AND deleted IS NULL",
            params![id.to_string(), format_datetime(&Utc::now())],
        )
    }

    async fn list_ssh_keys(&self, ctx: &Context, user_id: Uuid) -> Result<Vec<SshKey>, DepGitError> {
        ctx.check()?;
        let sql = format!(
            "SELECT {} FROM ssh_keys WHERE user_id = ?1 AND deleted IS NULL ORDER BY created, id",
            KEY_COLUMNS
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let keys = stmt
            .query_map(params![user_id.to_string()], key_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    async fn user_by_key(&self, ctx: &Context, data: &[u8]) -> Result<User, DepGitError> {
        ctx.check()?;
        self.conn()
            .query_row(
                "SELECT u.id, u.name, u.email, u.created, u.edited, u.deleted
                 FROM ssh_keys k JOIN users u ON u.id = k.user_id
                 WHERE k.data = ?1 AND k.deleted IS NULL AND u.deleted IS NULL",
                params![data],
                user_from_row,
            )
            .optional()?
            .ok_or(DepGitError::NotFound)
    }

    async fn create_repo(&self, ctx: &Context, repo: &Repo) -> Result<(), DepGitError> {
        ctx.check()?;
        repo.validate()?;
        self.conn()
            .execute(
                "INSERT INTO repos (id, name, created, edited, deleted) VALUES (?1, ?2, ?3, NULL, NULL)",
                params![repo.id.to_string(), repo.name, format_datetime(&repo.created)],
            )
            .map_err(write_error)?;
        debug!(repo = %repo.name, id = %repo.id, "repo created");
        Ok(())
    }

    async fn edit_repo(&self, ctx: &Context, repo: &Repo) -> Result<(), DepGitError> {
        ctx.check()?;
        repo.validate()?;
        let changed = self
            .conn()
            .execute(
                "UPDATE repos SET name = ?2, edited = ?3 WHERE id = ?1 AND deleted IS NULL",
                params![repo.id.to_string(), repo.name, format_datetime(&Utc::now())],
            )
            .map_err(write_error)?;
        if changed == 0 {
            return Err(DepGitError::NotFound);
        }
        Ok(())
    }

    async fn delete_repo(&self, ctx: &Context, id: Uuid) -> Result<(), DepGitError> {
        ctx.check()?;
        self.update_one(
            "UPDATE repos SET deleted = ?2 WHERE id = ?1 AND deleted IS NULL",
            params![id.to_string(), format_datetime(&Utc::now())],
        )
    }

    async fn get_repo(&self, ctx: &Context, id: Uuid) -> Result<Repo, DepGitError> {
        ctx.check()?;
        let sql = format!("SELECT {} FROM repos WHERE id = ?1 AND deleted IS NULL", REPO_COLUMNS);
        self.conn()
            .query_row(&sql, params![id.to_string()], repo_from_row)
            .optional()?
            .ok_or(DepGitError::NotFound)
    }

    async fn get_repo_by_name(&self, ctx: &Context, name: &str) -> Result<Repo, DepGitError> {
        ctx.check()?;
        let sql = format!("SELECT {} FROM repos WHERE name = ?1 AND deleted IS NULL", REPO_COLUMNS);
        self.conn()
            .query_row(&sql, params![name], repo_from_row)
            .optional()?
            .ok_or(DepGitError::NotFound)
    }

    async fn list_repos(&self, ctx: &Context) -> Result<Vec<Repo>, DepGitError> {
        ctx.check()?;
        let sql = format!("SELECT {} FROM repos WHERE deleted IS NULL ORDER BY name", REPO_COLUMNS);
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let repos = stmt
            .query_map([], repo_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(repos)
    }

    async fn create_access_role(&self, ctx: &Context, role: &AccessRole) -> Result<(), DepGitError> {
        ctx.check()?;
        role.validate()?;
        self.ensure_live("users", role.user_id)?;
        self.ensure_live("repos", role.repo_id)?;
        self.conn()
            .execute(
                "INSERT INTO access_roles (role_id, user_id, repo_id, branch_pattern, created, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                params![
                    role.role_id.to_string(),
                    role.user_id.to_string(),
                    role.repo_id.to_string(),
                    role.branch_pattern,
                    format_datetime(&role.created),
                ],
            )
            .map_err(write_error)?;
        debug!(role = %role.role_id, user = %role.user_id, repo = %role.repo_id, "access role created");
        Ok(())
    }

    async fn edit_access_role(&self, ctx: &Context, role: &AccessRole) -> Result<(), DepGitError> {
        ctx.check()?;
        role.validate()?;
        self.ensure_live("users", role.user_id)?;
        self.ensure_live("repos", role.repo_id)?;
        self.update_one(
            "UPDATE access_roles SET user_id = ?2, repo_id = ?3, branch_pattern = ?4
             WHERE role_id = ?1 AND deleted IS NULL",
            params![
                role.role_id.to_string(),
                role.user_id.to_string(),
                role.repo_id.to_string(),
                role.branch_pattern,
            ],
        )
    }

    async fn delete_access_role(&self, ctx: &Context, role_id: Uuid) -> Result<(), DepGitError> {
        ctx.check()?;
        self.update_one(
            "UPDATE access_roles SET deleted = ?2 WHERE role_id = ?1 AND deleted IS NULL",
            params![role_id.to_string(), format_datetime(&Utc::now())],
        )
    }

    async fn get_access_role(&self, ctx: &Context, role_id: Uuid) -> Result<AccessRole, DepGitError> {
        ctx.check()?;
        let sql = format!(
            "SELECT {} FROM access_roles WHERE role_id = ?1 AND deleted IS NULL",
            ROLE_COLUMNS
        );
        self.conn()
            .query_row(&sql, params![role_id.to_string()], role_from_row)
            .optional()?
            .ok_or(DepGitError::NotFound)
    }

    async fn list_access_roles(&self, ctx: &Context, repo_id: Uuid) -> Result<Vec<AccessRole>, DepGitError> {
        ctx.check()?;
        let sql = format!(
            "SELECT {} FROM access_roles WHERE repo_id = ?1 AND deleted IS NULL ORDER BY created, role_id",
            ROLE_COLUMNS
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let roles = stmt
            .query_map(params![repo_id.to_string()], role_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roles)
    }

    async fn roles_for(
        &self,
        ctx: &Context,
        user_id: Uuid,
        repo_id: Uuid,
    ) -> Result<Vec<AccessRole>, DepGitError> {
        ctx.check()?;
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.role_id, r.user_id, r.repo_id, r.branch_pattern, r.created, r.deleted
             FROM access_roles r
             JOIN users u ON u.id = r.user_id
             JOIN repos p ON p.id = r.repo_id
             WHERE r.user_id = ?1 AND r.repo_id = ?2
               AND r.deleted IS NULL AND u.deleted IS NULL AND p.deleted IS NULL",
        )?;
        let roles = stmt
            .query_map(params![user_id.to_string(), repo_id.to_string()], role_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roles)
    }
}

impl SqliteDatabase {
    fn ref_value(&self, repo_id: Uuid, name: &str) -> Result<Option<HashValue>, DepGitError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT object_id FROM refs WHERE repo_id = ?1 AND name = ?2",
                params![repo_id.to_string(), name],
                |row| hash_at(row, 0),
            )
            .optional()?)
    }

    /// Tells a lost compare-and-swap apart from a missing ref.
    fn cas_failure(&self, repo_id: Uuid, name: &str) -> DepGitError {
        match self.ref_value(repo_id, name) {
            Ok(Some(_)) => DepGitError::StaleRef,
            Ok(None) => DepGitError::NotFound,
            Err(e) => e,
        }
    }
}

#[async_trait]
impl RefsManager for SqliteDatabase {
    async fn refs(&self, ctx: &Context, repo_id: Uuid) -> Result<Vec<RefItem>, DepGitError> {
        ctx.check()?;
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name, object_id FROM refs WHERE repo_id = ?1 ORDER BY name")?;
        let refs = stmt
            .query_map(params![repo_id.to_string()], |row| {
                Ok(RefItem::new(row.get::<_, String>(0)?, hash_at(row, 1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    async fn get_ref(&self, ctx: &Context, repo_id: Uuid, name: &str) -> Result<RefItem, DepGitError> {
        ctx.check()?;
        self.ref_value(repo_id, name)?
            .map(|value| RefItem::new(name, value))
            .ok_or(DepGitError::NotFound)
    }

    async fn create_ref(
        &self,
        ctx: &Context,
        repo_id: Uuid,
        name: &str,
        value: HashValue,
    ) -> Result<(), DepGitError> {
        ctx.check()?;
        self.conn()
            .execute(
                "INSERT INTO refs (repo_id, name, object_id, updated) VALUES (?1, ?2, ?3, ?4)",
                params![
                    repo_id.to_string(),
                    name,
                    value.to_string(),
                    format_datetime(&Utc::now()),
                ],
            )
            .map_err(write_error)?;
        Ok(())
    }

    async fn update_ref(
        &self,
        ctx: &Context,
        repo_id: Uuid,
        name: &str,
        old: HashValue,
        new: HashValue,
    ) -> Result<(), DepGitError> {
        ctx.check()?;
        let changed = self.conn().execute(
            "UPDATE refs SET object_id = ?4, updated = ?5
             WHERE repo_id = ?1 AND name = ?2 AND object_id = ?3",
            params![
                repo_id.to_string(),
                name,
                old.to_string(),
                new.to_string(),
                format_datetime(&Utc::now()),
            ],
        )?;
        if changed == 0 {
            return Err(self.cas_failure(repo_id, name));
        }
        Ok(())
    }

    async fn delete_ref(
        &self,
        ctx: &Context,
        repo_id: Uuid,
        name: &str,
        old: HashValue,
    ) -> Result<(), DepGitError> {
        ctx.check()?;
        let changed = self.conn().execute(
            "DELETE FROM refs WHERE repo_id = ?1 AND name = ?2 AND object_id = ?3",
            params![repo_id.to_string(), name, old.to_string()],
        )?;
        if changed == 0 {
            return Err(self.cas_failure(repo_id, name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SshKeyType;

    fn db() -> SqliteDatabase {
        SqliteDatabase::open_in_memory().unwrap()
    }

    fn id(n: u8) -> HashValue {
        HashValue::from([n; 20])
    }

    #[tokio::test]
    async fn test_user_crud_and_soft_delete() {
        let db = db();
        let ctx = Context::background();
        let mut user = User::new("alice", "alice@example.com");
        db.create_user(&ctx, &user).await.unwrap();
        assert!(matches!(
            db.create_user(&ctx, &user).await,
            Err(DepGitError::AlreadyExists)
        ));

        user.email = "alice@corp.example".to_string();
        db.edit_user(&ctx, &user).await.unwrap();
        let stored = db.get_user(&ctx, user.id).await.unwrap();
        assert_eq!(stored.email, "alice@corp.example");
        assert!(stored.edited.is_some());
        assert_eq!(db.list_users(&ctx).await.unwrap().len(), 1);

        db.delete_user(&ctx, user.id).await.unwrap();
        assert!(matches!(db.get_user(&ctx, user.id).await, Err(DepGitError::NotFound)));
        assert!(matches!(db.edit_user(&ctx, &user).await, Err(DepGitError::NotFound)));
        assert!(matches!(db.delete_user(&ctx, user.id).await, Err(DepGitError::NotFound)));
        assert!(db.list_users(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_data_is_rejected_before_insert() {
        let db = db();
        let ctx = Context::background();
        let user = User::new("bob", "not-an-email");
        assert!(matches!(
            db.create_user(&ctx, &user).await,
            Err(DepGitError::BadData(_))
        ));
        assert!(matches!(db.get_user(&ctx, user.id).await, Err(DepGitError::NotFound)));
    }

    #[tokio::test]
    async fn test_cancelled_context_runs_no_statement() {
        let db = db();
        let ctx = Context::background();
        ctx.cancel();
        let user = User::new("carol", "carol@example.com");
        assert!(matches!(
            db.create_user(&ctx, &user).await,
            Err(DepGitError::Cancelled)
        ));
        let live = Context::background();
        assert!(matches!(db.get_user(&live, user.id).await, Err(DepGitError::NotFound)));
    }

    #[tokio::test]
    async fn test_user_by_key() {
        let db = db();
        let ctx = Context::background();
        let user = User::new("dave", "dave@example.com");
        db.create_user(&ctx, &user).await.unwrap();
        let key = SshKey::new(user.id, "laptop", SshKeyType::Ed25519, vec![1, 2, 3]);
        db.add_ssh_key(&ctx, &key).await.unwrap();

        assert_eq!(db.user_by_key(&ctx, &[1, 2, 3]).await.unwrap().id, user.id);
        assert!(matches!(
            db.user_by_key(&ctx, &[9, 9]).await,
            Err(DepGitError::NotFound)
        ));

        let dup = SshKey::new(user.id, "copy", SshKeyType::Ed25519, vec![1, 2, 3]);
        assert!(matches!(
            db.add_ssh_key(&ctx, &dup).await,
            Err(DepGitError::AlreadyExists)
        ));
        assert_eq!(db.list_ssh_keys(&ctx, user.id).await.unwrap(), vec![key.clone()]);

        db.delete_ssh_key(&ctx, key.id).await.unwrap();
        assert!(matches!(
            db.user_by_key(&ctx, &[1, 2, 3]).await,
            Err(DepGitError::NotFound)
        ));
        // the bytes can be registered again once the old key is gone
        db.add_ssh_key(&ctx, &dup).await.unwrap();
        db.delete_user(&ctx, user.id).await.unwrap();
        assert!(matches!(
            db.user_by_key(&ctx, &[1, 2, 3]).await,
            Err(DepGitError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_key_for_missing_user() {
        let db = db();
        let ctx = Context::background();
        let key = SshKey::new(Uuid::new_v4(), "orphan", SshKeyType::Ed25519, vec![4]);
        assert!(matches!(
            db.add_ssh_key(&ctx, &key).await,
            Err(DepGitError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_repo_names_unique_among_live_rows() {
        let db = db();
        let ctx = Context::background();
        let repo = Repo::new("project");
        db.create_repo(&ctx, &repo).await.unwrap();
        assert_eq!(db.get_repo_by_name(&ctx, "project").await.unwrap().id, repo.id);
        assert!(matches!(
            db.create_repo(&ctx, &Repo::new("project")).await,
            Err(DepGitError::AlreadyExists)
        ));
        assert!(matches!(
            db.create_repo(&ctx, &Repo::new("bad/name")).await,
            Err(DepGitError::BadData(_))
        ));

        db.delete_repo(&ctx, repo.id).await.unwrap();
        assert!(matches!(
            db.get_repo_by_name(&ctx, "project").await,
            Err(DepGitError::NotFound)
        ));
        let again = Repo::new("project");
        db.create_repo(&ctx, &again).await.unwrap();
        assert_eq!(db.list_repos(&ctx).await.unwrap(), vec![again]);
    }

    #[tokio::test]
    async fn test_roles() {
        let db = db();
        let ctx = Context::background();
        let user = User::new("erin", "erin@example.com");
        let repo = Repo::new("tools");
        db.create_user(&ctx, &user).await.unwrap();
        db.create_repo(&ctx, &repo).await.unwrap();

        let missing_user = AccessRole::new(Uuid::new_v4(), repo.id, None);
        assert!(matches!(
            db.create_access_role(&ctx, &missing_user).await,
            Err(DepGitError::NotFound)
        ));

        let mut role = AccessRole::new(user.id, repo.id, Some("refs/heads/*"));
        db.create_access_role(&ctx, &role).await.unwrap();
        let other = AccessRole::new(user.id, repo.id, Some("refs/tags/*"));
        db.create_access_role(&ctx, &other).await.unwrap();
        assert_eq!(db.roles_for(&ctx, user.id, repo.id).await.unwrap().len(), 2);

        role.branch_pattern = Some("refs/heads/main".to_string());
        db.edit_access_role(&ctx, &role).await.unwrap();
        assert_eq!(
            db.get_access_role(&ctx, role.role_id).await.unwrap().branch_pattern.as_deref(),
            Some("refs/heads/main")
        );

        db.delete_access_role(&ctx, other.role_id).await.unwrap();
        assert_eq!(db.list_access_roles(&ctx, repo.id).await.unwrap().len(), 1);

        db.delete_repo(&ctx, repo.id).await.unwrap();
        assert!(db.roles_for(&ctx, user.id, repo.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refs_compare_and_swap() {
        let db = db();
        let ctx = Context::background();
        let repo = Repo::new("refs");
        db.create_repo(&ctx, &repo).await.unwrap();

        db.create_ref(&ctx, repo.id, "refs/heads/main", id(1)).await.unwrap();
        assert!(matches!(
            db.create_ref(&ctx, repo.id, "refs/heads/main", id(2)).await,
            Err(DepGitError::AlreadyExists)
        ));

        assert!(matches!(
            db.update_ref(&ctx, repo.id, "refs/heads/main", id(9), id(2)).await,
            Err(DepGitError::StaleRef)
        ));
        db.update_ref(&ctx, repo.id, "refs/heads/main", id(1), id(2)).await.unwrap();
        assert_eq!(db.get_ref(&ctx, repo.id, "refs/heads/main").await.unwrap().value, id(2));
        assert!(matches!(
            db.update_ref(&ctx, repo.id, "refs/heads/nope", id(1), id(2)).await,
            Err(DepGitError::NotFound)
        ));

        db.create_ref(&ctx, repo.id, "refs/heads/a", id(3)).await.unwrap();
        let names: Vec<String> = db
            .refs(&ctx, repo.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["refs/heads/a", "refs/heads/main"]);

        assert!(matches!(
            db.delete_ref(&ctx, repo.id, "refs/heads/a", id(4)).await,
            Err(DepGitError::StaleRef)
        ));
        db.delete_ref(&ctx, repo.id, "refs/heads/a", id(3)).await.unwrap();
        assert_eq!(db.refs(&ctx, repo.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("depgit.db");
        let ctx = Context::background();
        let repo = Repo::new("persisted");
        {
            let db = SqliteDatabase::open(&path).unwrap();
            db.create_repo(&ctx, &repo).await.unwrap();
        }
        let db = SqliteDatabase::open(&path).unwrap();
        assert_eq!(db.get_repo(&ctx, repo.id).await.unwrap().name, "persisted");
    }
}
