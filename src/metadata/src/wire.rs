//! Request and response messages of the metadata RPC service, in protojson form.
//!
//! Every response field defaults, since the gateway omits empty fields.

use launcher_common::types::int64;
use launcher_common::types::{
    Artifact, ArtifactType, Context, ContextType, Event, Execution, ExecutionType,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetContextByTypeAndNameRequest {
    pub type_name: String,
    pub context_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetContextByTypeAndNameResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetContextTypeRequest {
    pub type_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetContextTypeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_type: Option<ContextType>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutContextTypeRequest {
    pub context_type: ContextType,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutExecutionTypeRequest {
    pub execution_type: ExecutionType,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutArtifactTypeRequest {
    pub artifact_type: ArtifactType,
}

/// Response of every `Put*Type` call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PutTypeResponse {
    #[serde(with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutContextsRequest {
    pub contexts: Vec<Context>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PutContextsResponse {
    #[serde(with = "int64::vec")]
    pub context_ids: Vec<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactAndEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutExecutionRequest {
    pub execution: Execution,
    #[serde(default)]
    pub artifact_event_pairs: Vec<ArtifactAndEvent>,
    #[serde(default)]
    pub contexts: Vec<Context>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PutExecutionResponse {
    #[serde(with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<i64>,
    #[serde(with = "int64::vec")]
    pub artifact_ids: Vec<i64>,
    #[serde(with = "int64::vec")]
    pub context_ids: Vec<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetExecutionsByIdRequest {
    #[serde(with = "int64::vec")]
    pub execution_ids: Vec<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetExecutionsByIdResponse {
    pub executions: Vec<Execution>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutArtifactsRequest {
    pub artifacts: Vec<Artifact>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PutArtifactsResponse {
    #[serde(with = "int64::vec")]
    pub artifact_ids: Vec<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetArtifactsByIdRequest {
    #[serde(with = "int64::vec")]
    pub artifact_ids: Vec<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetArtifactsByIdResponse {
    pub artifacts: Vec<Artifact>,
}
