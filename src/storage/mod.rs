use std::path::Path as FsPath;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};
use tracing::{debug, info};

use crate::config::storage::{S3Config, StorageBackend, StorageConfig};
use crate::context::Context;
use crate::error::DepGitError;

pub type ObjectStream = BoxStream<'static, Result<Bytes, DepGitError>>;

/// Write-once object storage split into namespaces.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Fails with `AlreadyExists` if `name` is present; never overwrites.
    async fn put(&self, ctx: &Context, namespace: &str, name: &str, content: Bytes) -> Result<(), DepGitError>;
    /// Fails with `NotFound` if absent.
    async fn get(&self, ctx: &Context, namespace: &str, name: &str) -> Result<ObjectStream, DepGitError>;
    /// Names in `namespace`, sorted. An unknown namespace lists as empty.
    async fn list(&self, ctx: &Context, namespace: &str) -> Result<Vec<String>, DepGitError>;
}

#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStorage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        ObjectStorage { store }
    }

    pub fn local<P: AsRef<FsPath>>(root: P) -> Result<Self, DepGitError> {
        std::fs::create_dir_all(root.as_ref())?;
        Ok(Self::new(Arc::new(LocalFileSystem::new_with_prefix(root)?)))
    }

    pub fn s3(cfg: &S3Config) -> Result<Self, DepGitError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&cfg.bucket)
            .with_region(&cfg.region)
            .with_allow_http(cfg.allow_http);
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key_id) = &cfg.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &cfg.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        Ok(Self::new(Arc::new(builder.build()?)))
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    pub fn from_config(cfg: &StorageConfig) -> Result<Self, DepGitError> {
        info!(backend = ?cfg.backend, "opening object storage");
        match cfg.backend {
            StorageBackend::Local => Self::local(&cfg.path),
            StorageBackend::S3 => Self::s3(&cfg.s3),
            StorageBackend::Memory => Ok(Self::memory()),
        }
    }
}

fn check_segment(kind: &str, value: &str) -> Result<(), DepGitError> {
    if value.is_empty() || value.contains('/') || value == "." || value == ".." {
        return Err(DepGitError::BadData(format!("invalid {} {:?}", kind, value)));
    }
    Ok(())
}

fn object_path(namespace: &str, name: &str) -> Result<Path, DepGitError> {
    check_segment("namespace", namespace)?;
    check_segment("object name", name)?;
    Ok(Path::from(format!("{}/{}", namespace, name)))
}

#[async_trait]
impl Storage for ObjectStorage {
    async fn put(&self, ctx: &Context, namespace: &str, name: &str, content: Bytes) -> Result<(), DepGitError> {
        ctx.check()?;
        let path = object_path(namespace, name)?;
        let size = content.len();
        self.store
            .put_opts(&path, PutPayload::from(content), PutOptions::from(PutMode::Create))
            .await?;
        debug!(%path, size, "object stored");
        Ok(())
    }

    async fn get(&self, ctx: &Context, namespace: &str, name: &str) -> Result<ObjectStream, DepGitError> {
        ctx.check()?;
        let path = object_path(namespace, name)?;
        let result = self.store.get(&path).await?;
        Ok(result.into_stream().map_err(DepGitError::from).boxed())
    }

    async fn list(&self, ctx: &Context, namespace: &str) -> Result<Vec<String>, DepGitError> {
        ctx.check()?;
        check_segment("namespace", namespace)?;
        let prefix = Path::from(namespace);
        let mut names = Vec::new();
        let mut entries = self.store.list(Some(&prefix));
        while let Some(entry) = entries.next().await {
            match entry {
                Ok(meta) => {
                    if let Some(name) = meta.location.filename() {
                        names.push(name.to_string());
                    }
                }
                Err(object_store::Error::NotFound { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Reads a whole object into memory.
pub async fn read_all(stream: ObjectStream) -> Result<Bytes, DepGitError> {
    let chunks: Vec<Bytes> = stream.try_collect().await?;
    Ok(Bytes::from(chunks.concat()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(storage: ObjectStorage) {
        let ctx = Context::background();
        assert!(storage.list(&ctx, "ns").await.unwrap().is_empty());

        storage.put(&ctx, "ns", "b", Bytes::from_static(b"second")).await.unwrap();
        storage.put(&ctx, "ns", "a", Bytes::from_static(b"first")).await.unwrap();
        storage.put(&ctx, "other", "c", Bytes::from_static(b"elsewhere")).await.unwrap();
        assert!(matches!(
            storage.put(&ctx, "ns", "a", Bytes::from_static(b"again")).await,
            Err(DepGitError::AlreadyExists)
        ));

        let content = read_all(storage.get(&ctx, "ns", "a").await.unwrap()).await.unwrap();
        assert_eq!(&content[..], b"first");
        assert!(matches!(
            storage.get(&ctx, "ns", "missing").await,
            Err(DepGitError::NotFound)
        ));
        assert_eq!(storage.list(&ctx, "ns").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_memory_backend() {
        exercise(ObjectStorage::memory()).await;
    }

    #[tokio::test]
    async fn test_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        exercise(ObjectStorage::local(dir.path().join("objects")).unwrap()).await;
    }

    #[tokio::test]
    async fn test_rejects_bad_names_and_cancelled_context() {
        let storage = ObjectStorage::memory();
        let ctx = Context::background();
        assert!(matches!(
            storage.put(&ctx, "ns/sub", "a", Bytes::new()).await,
            Err(DepGitError::BadData(_))
        ));
        assert!(matches!(
            storage.put(&ctx, "ns", "", Bytes::new()).await,
            Err(DepGitError::BadData(_))
        ));
        ctx.cancel();
        assert!(matches!(
            storage.put(&ctx, "ns", "a", Bytes::new()).await,
            Err(DepGitError::Cancelled)
        ));
    }
}
