use crate::errors::{MetadataError, MetadataResult};
use crate::service::{method, MetadataStoreService, SERVICE_PATH};
use crate::wire::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// Metadata service reached through its HTTP/JSON gateway.
#[derive(Clone, Debug)]
pub struct HttpMetadataStore {
    client: Client,
    base_url: String,
}

impl HttpMetadataStore {
    pub fn new(address: &str, port: u16) -> Self {
        Self::with_client(Client::new(), &format!("http://{}:{}", address, port))
    }

    pub fn with_client(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            base_url: format!("{}/{}", endpoint.trim_end_matches('/'), SERVICE_PATH),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> MetadataResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        let start_time = Instant::now();

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!(
            "{} answered {} in {:?}",
            method,
            status,
            start_time.elapsed()
        );

        if !status.is_success() {
            return Err(MetadataError::from_status(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_str("{}")?);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

impl MetadataStoreService for HttpMetadataStore {
    async fn get_context_by_type_and_name(
        &self,
        request: GetContextByTypeAndNameRequest,
    ) -> MetadataResult<GetContextByTypeAndNameResponse> {
        self.call(method::GET_CONTEXT_BY_TYPE_AND_NAME, &request)
            .await
    }

    async fn get_context_type(
        &self,
        request: GetContextTypeRequest,
    ) -> MetadataResult<GetContextTypeResponse> {
        self.call(method::GET_CONTEXT_TYPE, &request).await
    }

    async fn put_context_type(
        &self,
        request: PutContextTypeRequest,
    ) -> MetadataResult<PutTypeResponse> {
        self.call(method::PUT_CONTEXT_TYPE, &request).await
    }

    async fn put_contexts(
        &self,
        request: PutContextsRequest,
    ) -> MetadataResult<PutContextsResponse> {
        self.call(method::PUT_CONTEXTS, &request).await
    }

    async fn put_execution_type(
        &self,
        request: PutExecutionTypeRequest,
    ) -> MetadataResult<PutTypeResponse> {
        self.call(method::PUT_EXECUTION_TYPE, &request).await
    }

    async fn put_execution(
        &self,
        request: PutExecutionRequest,
    ) -> MetadataResult<PutExecutionResponse> {
        self.call(method::PUT_EXECUTION, &request).await
    }

    async fn get_executions_by_id(
        &self,
        request: GetExecutionsByIdRequest,
    ) -> MetadataResult<GetExecutionsByIdResponse> {
        self.call(method::GET_EXECUTIONS_BY_ID, &request).await
    }

    async fn put_artifact_type(
        &self,
        request: PutArtifactTypeRequest,
    ) -> MetadataResult<PutTypeResponse> {
        self.call(method::PUT_ARTIFACT_TYPE, &request).await
    }

    async fn put_artifacts(
        &self,
        request: PutArtifactsRequest,
    ) -> MetadataResult<PutArtifactsResponse> {
        self.call(method::PUT_ARTIFACTS, &request).await
    }

    async fn get_artifacts_by_id(
        &self,
        request: GetArtifactsByIdRequest,
    ) -> MetadataResult<GetArtifactsByIdResponse> {
        self.call(method::GET_ARTIFACTS_BY_ID, &request).await
    }
}
