use launcher_aws::{S3ObjectStore, S3Settings};
use launcher_common::object_store::{
    LocalObjectStore, ObjectStore, ObjectStoreOpener, StoreError, StoreResult,
};
use launcher_common::storage_root::BucketUrl;
use launcher_gcp::{GcsObjectStore, GcsSettings};

/// Picks the object-store backend from the scheme of the root URL.
pub struct SchemeStoreOpener {
    s3: S3Settings,
    gcs: GcsSettings,
}

impl SchemeStoreOpener {
    pub fn new(s3: S3Settings, gcs: GcsSettings) -> Self {
        Self { s3, gcs }
    }
}

#[async_trait::async_trait]
impl ObjectStoreOpener for SchemeStoreOpener {
    async fn open(&self, root_url: &str) -> StoreResult<Box<dyn ObjectStore>> {
        let url = BucketUrl::parse(root_url)?;
        tracing::debug!("Opening {} bucket {:?}", url.scheme, url.bucket);

        match url.scheme.as_str() {
            "gs" => Ok(Box::new(GcsObjectStore::open(root_url, &self.gcs)?)),
            "s3" => Ok(Box::new(S3ObjectStore::open(root_url, &self.s3).await?)),
            "file" => Ok(Box::new(LocalObjectStore::open(root_url)?)),
            other => Err(StoreError::Open {
                url: root_url.to_string(),
                reason: format!("no object store for scheme {:?}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opener() -> SchemeStoreOpener {
        SchemeStoreOpener::new(S3Settings::default(), GcsSettings::default())
    }

    #[tokio::test]
    async fn opens_local_buckets() {
        let store = opener().open("file:///tmp?prefix=launcher/").await.unwrap();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_unknown_schemes() {
        let result = opener().open("azblob://container").await;
        assert!(matches!(result, Err(StoreError::Open { .. })));
    }
}
