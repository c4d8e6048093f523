//! `gs://` backend over the Cloud Storage JSON API.

use futures_util::TryStreamExt;
use launcher_common::object_store::{BlobReader, BlobWriter, ObjectStore, StoreError, StoreResult};
use launcher_common::storage_root::BucketUrl;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio_util::io::StreamReader;

pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

// object names go into a single path segment or query value
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcsSettings {
    /// Defaults to [`DEFAULT_GCS_ENDPOINT`]
    pub endpoint: Option<String>,
    /// Sent as a bearer token when present
    pub access_token: Option<String>,
}

pub struct GcsObjectStore {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
    url: BucketUrl,
}

impl GcsObjectStore {
    pub fn open(root_url: &str, settings: &GcsSettings) -> StoreResult<Self> {
        let url = BucketUrl::parse(root_url)?;
        if url.scheme != "gs" {
            return Err(StoreError::Open {
                url: root_url.to_string(),
                reason: format!("unexpected scheme {:?} for a GCS bucket", url.scheme),
            });
        }

        let endpoint = settings
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_GCS_ENDPOINT)
            .trim_end_matches('/')
            .to_string();
        tracing::debug!(
            "Opened GCS bucket {:?} with prefix {:?} at {}",
            url.bucket,
            url.prefix,
            endpoint
        );

        Ok(Self {
            client: Client::new(),
            endpoint,
            access_token: settings.access_token.clone(),
            url,
        })
    }

    fn encoded_object_name(&self, key: &str) -> String {
        utf8_percent_encode(&self.url.object_name(key), OBJECT_NAME).to_string()
    }

    pub fn download_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            self.endpoint,
            self.url.bucket,
            self.encoded_object_name(key)
        )
    }

    pub fn upload_url(&self, key: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint,
            self.url.bucket,
            self.encoded_object_name(key)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn backend_error(key: &str, reason: impl ToString) -> StoreError {
    StoreError::Backend {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait::async_trait]
impl ObjectStore for GcsObjectStore {
    async fn new_reader(&self, key: &str) -> StoreResult<BlobReader> {
        let response = self
            .authorize(self.client.get(self.download_url(key)))
            .send()
            .await
            .map_err(|e| backend_error(key, e))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(backend_error(key, format!("{}: {}", status, body)));
            }
        }

        let stream = response
            .bytes_stream()
            .map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn new_writer(&self, key: &str) -> StoreResult<Box<dyn BlobWriter>> {
        Ok(Box::new(GcsBlobWriter {
            request: Some(self.authorize(self.client.post(self.upload_url(key)))),
            key: key.to_string(),
            buffer: Vec::new(),
        }))
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

struct GcsBlobWriter {
    request: Option<RequestBuilder>,
    key: String,
    buffer: Vec<u8>,
}

#[async_trait::async_trait]
impl BlobWriter for GcsBlobWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> StoreResult<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn close(&mut self) -> StoreResult<()> {
        let request = self
            .request
            .take()
            .ok_or_else(|| backend_error(&self.key, "writer already closed"))?;

        let response = request
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(std::mem::take(&mut self.buffer))
            .send()
            .await
            .map_err(|e| backend_error(&self.key, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(backend_error(&self.key, format!("{}: {}", status, body)));
        }
        Ok(())
    }
}
