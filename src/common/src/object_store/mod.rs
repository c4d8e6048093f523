//! Blob storage capability used to stage artifact bytes.
//!
//! A store is opened once per root URL (see [`crate::storage_root::StorageRoot::to_base_url`]);
//! keys handed to it are relative to the bucket prefix carried by that URL.

mod local;
mod memory;

pub use local::LocalObjectStore;
pub use memory::{MemoryObjectStore, MemoryStoreOpener};

use crate::constants::UPLOAD_CHUNK_SIZE;
use crate::storage_root::StorageRootError;
use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    /// The root URL could not be opened
    Open { url: String, reason: String },

    NotFound { key: String },

    /// Local file or stream failure while copying `target`
    Io { target: String, source: io::Error },

    /// The backend rejected an operation on `key`
    Backend { key: String, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Open { url, reason } => {
                write!(f, "Failed to open bucket {:?}: {}", url, reason)
            }
            StoreError::NotFound { key } => write!(f, "Object {:?} does not exist", key),
            StoreError::Io { target, source } => write!(f, "I/O error on {:?}: {}", target, source),
            StoreError::Backend { key, reason } => {
                write!(f, "Storage backend failed on {:?}: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StorageRootError> for StoreError {
    fn from(error: StorageRootError) -> Self {
        match error {
            StorageRootError::InvalidBucketUrl { url, reason } => StoreError::Open { url, reason },
            other => StoreError::Open {
                url: String::new(),
                reason: other.to_string(),
            },
        }
    }
}

impl StoreError {
    pub fn io(target: impl AsRef<Path>, source: io::Error) -> Self {
        StoreError::Io {
            target: target.as_ref().to_string_lossy().into_owned(),
            source,
        }
    }
}

/// Streamed write into one object. Bytes become visible only once [`BlobWriter::close`]
/// succeeds; an error there is a failed write even if every chunk was accepted.
#[async_trait::async_trait]
pub trait BlobWriter: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> StoreResult<()>;
    async fn close(&mut self) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn new_reader(&self, key: &str) -> StoreResult<BlobReader>;
    async fn new_writer(&self, key: &str) -> StoreResult<Box<dyn BlobWriter>>;
    async fn close(&self) -> StoreResult<()>;
}

/// Opens an [`ObjectStore`] for a root URL, choosing the backend by scheme.
#[async_trait::async_trait]
pub trait ObjectStoreOpener: Send + Sync {
    async fn open(&self, root_url: &str) -> StoreResult<Box<dyn ObjectStore>>;
}

/// Stream-copies `key` to `path`, creating parent directories first. Returns the byte count.
pub async fn download_to_file(store: &dyn ObjectStore, key: &str, path: &Path) -> StoreResult<u64> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let mut reader = store.new_reader(key).await?;
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;

    let copied = tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(|e| StoreError::io(key, e))?;
    file.flush().await.map_err(|e| StoreError::io(path, e))?;

    Ok(copied)
}

/// Stream-copies the file at `path` to `key`. Returns the byte count.
pub async fn upload_file(store: &dyn ObjectStore, path: &Path, key: &str) -> StoreResult<u64> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    let mut writer = store.new_writer(key).await?;

    let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        if read == 0 {
            break;
        }
        writer.write_chunk(&buffer[..read]).await?;
        copied += read as u64;
    }

    writer.close().await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn download_creates_parent_directories() {
        let opener = MemoryStoreOpener::new();
        opener.insert("prefix/upstream/data", b"rows".to_vec());
        let store = opener.open("gs://bucket?prefix=prefix/").await.unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inputs").join("ds").join("data");
        let copied = download_to_file(store.as_ref(), "upstream/data", &path)
            .await
            .unwrap();

        assert_eq!(copied, 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"rows");
    }

    #[tokio::test]
    async fn download_of_missing_key_is_not_found() {
        let opener = MemoryStoreOpener::new();
        let store = opener.open("gs://bucket").await.unwrap();
        let dir = TempDir::new().unwrap();

        let err = download_to_file(store.as_ref(), "missing", &dir.path().join("data"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { key } if key == "missing"));
    }

    #[tokio::test]
    async fn upload_streams_whole_file_in_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        let content: Vec<u8> = (0..UPLOAD_CHUNK_SIZE * 2 + 17)
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&path, &content).unwrap();

        let opener = MemoryStoreOpener::new();
        let store = opener.open("s3://bucket?prefix=runs/").await.unwrap();
        let copied = upload_file(store.as_ref(), &path, "p/r/t/data").await.unwrap();

        assert_eq!(copied, content.len() as u64);
        assert_eq!(opener.get("runs/p/r/t/data"), Some(content));
    }

    #[tokio::test]
    async fn upload_of_missing_file_is_io_error() {
        let opener = MemoryStoreOpener::new();
        let store = opener.open("gs://bucket").await.unwrap();

        let err = upload_file(store.as_ref(), Path::new("/nonexistent/launcher/data"), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(opener.get("k").is_none());
    }
}
