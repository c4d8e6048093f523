use crate::config::{resolve_available_aws_config, AwsConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use launcher_common::object_store::{BlobReader, BlobWriter, ObjectStore, StoreError, StoreResult};
use launcher_common::storage_root::BucketUrl;

/// Connection settings of the `s3://` backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct S3Settings {
    pub init_type: AwsConfig,
    pub region: Option<String>,
    /// S3-compatible endpoint, addressed path-style
    pub endpoint_url: Option<String>,
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    url: BucketUrl,
}

impl S3ObjectStore {
    pub async fn open(root_url: &str, settings: &S3Settings) -> StoreResult<Self> {
        let url = BucketUrl::parse(root_url)?;
        if url.scheme != "s3" {
            return Err(StoreError::Open {
                url: root_url.to_string(),
                reason: format!("unexpected scheme {:?} for an S3 bucket", url.scheme),
            });
        }

        let sdk_config =
            resolve_available_aws_config(settings.init_type.clone(), settings.region.as_deref())
                .await
                .ok_or_else(|| StoreError::Open {
                    url: root_url.to_string(),
                    reason: "could not resolve AWS credentials".to_string(),
                })?;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }

        tracing::debug!("Opened S3 bucket {:?} with prefix {:?}", url.bucket, url.prefix);
        Ok(Self::with_client(
            aws_sdk_s3::Client::from_conf(builder.build()),
            url,
        ))
    }

    pub fn with_client(client: aws_sdk_s3::Client, url: BucketUrl) -> Self {
        Self { client, url }
    }

    pub fn bucket(&self) -> &str {
        &self.url.bucket
    }

    pub fn object_name(&self, key: &str) -> String {
        self.url.object_name(key)
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn new_reader(&self, key: &str) -> StoreResult<BlobReader> {
        let output = self
            .client
            .get_object()
            .bucket(self.bucket())
            .key(self.object_name(key))
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    StoreError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Backend {
                        key: key.to_string(),
                        reason: DisplayErrorContext(&err).to_string(),
                    }
                }
            })?;

        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn new_writer(&self, key: &str) -> StoreResult<Box<dyn BlobWriter>> {
        Ok(Box::new(S3BlobWriter {
            client: self.client.clone(),
            bucket: self.bucket().to_string(),
            key: key.to_string(),
            object_name: self.object_name(key),
            buffer: Vec::new(),
        }))
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

// S3 has no appendable objects; the whole body is sent by one PutObject on close.
struct S3BlobWriter {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    object_name: String,
    buffer: Vec<u8>,
}

#[async_trait::async_trait]
impl BlobWriter for S3BlobWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> StoreResult<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn close(&mut self) -> StoreResult<()> {
        let body = ByteStream::from(std::mem::take(&mut self.buffer));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.object_name)
            .body(body)
            .send()
            .await
            .map_err(|err| StoreError::Backend {
                key: self.key.clone(),
                reason: DisplayErrorContext(&err).to_string(),
            })?;
        Ok(())
    }
}
