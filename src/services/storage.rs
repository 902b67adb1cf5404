use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Blob store addressed by flat, server-generated keys.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Write a new object. Fails with `AlreadyExists` instead of overwriting.
    async fn write_file(&self, key: &str, data: Bytes) -> StorageResult<u64>;
    /// Remove an object. A missing object is reported as `NotFound`.
    async fn delete_file(&self, key: &str) -> StorageResult<()>;
    async fn file_exists(&self, key: &str) -> StorageResult<bool>;
    async fn open_file(&self, key: &str) -> StorageResult<File>;
}

pub struct LocalStorageService {
    root: PathBuf,
}

impl LocalStorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make sure the root directory exists
    pub async fn init(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key == "."
            || key == ".."
            || key.contains('/')
            || key.contains('\\')
            || key.contains('\0')
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

fn map_not_found(key: &str, e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
        ErrorKind::AlreadyExists => StorageError::AlreadyExists(key.to_string()),
        _ => StorageError::Io(e),
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn write_file(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let path = self.resolve(key)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| map_not_found(key, e))?;

        file.write_all(&data).await?;
        file.flush().await?;
        file.sync_all().await?;

        tracing::debug!("Stored object {} ({} bytes)", key, data.len());
        Ok(data.len() as u64)
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| map_not_found(key, e))
    }

    async fn file_exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn open_file(&self, key: &str) -> StorageResult<File> {
        let path = self.resolve(key)?;
        File::open(&path).await.map_err(|e| map_not_found(key, e))
    }
}
