use super::{BlobReader, BlobWriter, ObjectStore, StoreError, StoreResult};
use crate::storage_root::BucketUrl;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// `file:///` backend: the bucket is the first path component, keys live under the prefix.
#[derive(Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn open(root_url: &str) -> StoreResult<Self> {
        let url = BucketUrl::parse(root_url)?;
        if url.scheme != "file" {
            return Err(StoreError::Open {
                url: root_url.to_string(),
                reason: format!("unexpected scheme {:?} for a local bucket", url.scheme),
            });
        }

        let root = PathBuf::from("/").join(&url.bucket).join(&url.prefix);
        tracing::debug!("Opened local bucket at {:?}", root);
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn new_reader(&self, key: &str) -> StoreResult<BlobReader> {
        let path = self.path_for(key);
        match File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn new_writer(&self, key: &str) -> StoreResult<Box<dyn BlobWriter>> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let file = File::create(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(Box::new(LocalBlobWriter { path, file }))
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

struct LocalBlobWriter {
    path: PathBuf,
    file: File,
}

#[async_trait::async_trait]
impl BlobWriter for LocalBlobWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> StoreResult<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }

    async fn close(&mut self) -> StoreResult<()> {
        self.file
            .flush()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }
}
