use crate::errors::MetadataResult;
use crate::wire::*;

/// gRPC service path the JSON gateway mounts every method under.
pub const SERVICE_PATH: &str = "ml_metadata.MetadataStoreService";

pub mod method {
    pub const GET_CONTEXT_BY_TYPE_AND_NAME: &str = "GetContextByTypeAndName";
    pub const GET_CONTEXT_TYPE: &str = "GetContextType";
    pub const PUT_CONTEXT_TYPE: &str = "PutContextType";
    pub const PUT_CONTEXTS: &str = "PutContexts";
    pub const PUT_EXECUTION_TYPE: &str = "PutExecutionType";
    pub const PUT_EXECUTION: &str = "PutExecution";
    pub const GET_EXECUTIONS_BY_ID: &str = "GetExecutionsByID";
    pub const PUT_ARTIFACT_TYPE: &str = "PutArtifactType";
    pub const PUT_ARTIFACTS: &str = "PutArtifacts";
    pub const GET_ARTIFACTS_BY_ID: &str = "GetArtifactsByID";

    /// Methods that change the store.
    pub const MUTATING: [&str; 6] = [
        PUT_CONTEXT_TYPE,
        PUT_CONTEXTS,
        PUT_EXECUTION_TYPE,
        PUT_EXECUTION,
        PUT_ARTIFACT_TYPE,
        PUT_ARTIFACTS,
    ];
}

/// The subset of the lineage store RPC surface the launcher consumes.
#[allow(async_fn_in_trait)]
pub trait MetadataStoreService {
    async fn get_context_by_type_and_name(
        &self,
        request: GetContextByTypeAndNameRequest,
    ) -> MetadataResult<GetContextByTypeAndNameResponse>;

    async fn get_context_type(
        &self,
        request: GetContextTypeRequest,
    ) -> MetadataResult<GetContextTypeResponse>;

    async fn put_context_type(&self, request: PutContextTypeRequest)
        -> MetadataResult<PutTypeResponse>;

    async fn put_contexts(&self, request: PutContextsRequest)
        -> MetadataResult<PutContextsResponse>;

    async fn put_execution_type(
        &self,
        request: PutExecutionTypeRequest,
    ) -> MetadataResult<PutTypeResponse>;

    async fn put_execution(&self, request: PutExecutionRequest)
        -> MetadataResult<PutExecutionResponse>;

    async fn get_executions_by_id(
        &self,
        request: GetExecutionsByIdRequest,
    ) -> MetadataResult<GetExecutionsByIdResponse>;

    async fn put_artifact_type(
        &self,
        request: PutArtifactTypeRequest,
    ) -> MetadataResult<PutTypeResponse>;

    async fn put_artifacts(&self, request: PutArtifactsRequest)
        -> MetadataResult<PutArtifactsResponse>;

    async fn get_artifacts_by_id(
        &self,
        request: GetArtifactsByIdRequest,
    ) -> MetadataResult<GetArtifactsByIdResponse>;
}
