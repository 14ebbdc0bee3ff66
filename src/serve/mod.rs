use std::sync::Arc;

use tracing::debug;

use crate::auth::{AccessControl, Auth};
use crate::context::Context;
use crate::database::{Database, SqliteDatabase};
use crate::error::DepGitError;
use crate::model::Repo;
use crate::objects::EncodedObject;
use crate::refs::RefsManager;
use crate::sha::HashValue;
use crate::storage::{Storage, read_all};

/// Shared handles every connection works against.
#[derive(Clone)]
pub struct AppCore {
    pub database: Arc<dyn Database>,
    pub refs: Arc<dyn RefsManager>,
    pub storage: Arc<dyn Storage>,
    pub auth: Arc<dyn Auth>,
}

impl AppCore {
    pub fn new(
        database: Arc<dyn Database>,
        refs: Arc<dyn RefsManager>,
        storage: Arc<dyn Storage>,
        auth: Arc<dyn Auth>,
    ) -> Self {
        Self {
            database,
            refs,
            storage,
            auth,
        }
    }

    /// Wires one SQLite database in as records, refs and access control.
    pub fn with_sqlite(db: Arc<SqliteDatabase>, storage: Arc<dyn Storage>) -> Self {
        let auth = Arc::new(AccessControl::new(db.clone()));
        Self::new(db.clone(), db, storage, auth)
    }

    /// Writes the object in loose format under the repository namespace.
    /// Returns false when an object with that id was already stored.
    pub async fn store_object(&self, ctx: &Context, repo: &Repo, object: &EncodedObject) -> Result<bool, DepGitError> {
        let loose = object.to_loose()?;
        match self
            .storage
            .put(ctx, &repo.namespace(), &object.id.to_string(), loose)
            .await
        {
            Ok(()) => Ok(true),
            Err(DepGitError::AlreadyExists) => {
                debug!(id = %object.id, "object already stored");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn read_object(&self, ctx: &Context, repo: &Repo, id: HashValue) -> Result<EncodedObject, DepGitError> {
        let stream = self.storage.get(ctx, &repo.namespace(), &id.to_string()).await?;
        let object = EncodedObject::from_loose(&read_all(stream).await?)?;
        if object.id != id {
            return Err(DepGitError::BadData(format!(
                "object stored as {} hashes to {}",
                id, object.id
            )));
        }
        Ok(object)
    }
}
