//! Records exchanged with the lineage-tracking store, in protojson form.
//!
//! The same encoding is used for the artifact side-channel files read for input artifacts and
//! for the records written to output artifact sink paths.

use super::int64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Properties = BTreeMap<String, Value>;

/// A property value attached to an artifact, context or execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ValueRepr", into = "ValueRepr")]
pub enum Value {
    Int(i64),
    Double(f64),
    String(String),
    Struct(serde_json::Value),
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRepr {
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    int_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    struct_value: Option<serde_json::Value>,
}

impl TryFrom<ValueRepr> for Value {
    type Error = String;

    fn try_from(repr: ValueRepr) -> Result<Self, Self::Error> {
        match repr {
            ValueRepr {
                int_value: Some(value),
                ..
            } => Ok(Value::Int(value)),
            ValueRepr {
                double_value: Some(value),
                ..
            } => Ok(Value::Double(value)),
            ValueRepr {
                string_value: Some(value),
                ..
            } => Ok(Value::String(value)),
            ValueRepr {
                struct_value: Some(value),
                ..
            } => Ok(Value::Struct(value)),
            _ => Err("property value has no intValue, doubleValue, stringValue or structValue".into()),
        }
    }
}

impl From<Value> for ValueRepr {
    fn from(value: Value) -> Self {
        match value {
            Value::Int(value) => ValueRepr {
                int_value: Some(value),
                ..Default::default()
            },
            Value::Double(value) => ValueRepr {
                double_value: Some(value),
                ..Default::default()
            },
            Value::String(value) => ValueRepr {
                string_value: Some(value),
                ..Default::default()
            },
            Value::Struct(value) => ValueRepr {
                struct_value: Some(value),
                ..Default::default()
            },
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactState {
    Unknown,
    Pending,
    Live,
    MarkedForDeletion,
    Deleted,
    Abandoned,
    Reference,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ArtifactState>,
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub create_time_since_epoch: Option<i64>,
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub last_update_time_since_epoch: Option<i64>,
}

impl Artifact {
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    pub fn uri(&self) -> &str {
        self.uri.as_deref().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactType {
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextType {
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
}

impl ContextType {
    pub fn named(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_properties: Properties,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionType {
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
}

impl ExecutionType {
    pub fn named(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Unknown,
    New,
    Running,
    Complete,
    Failed,
    Cached,
    Canceled,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_state: Option<ExecutionState>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_properties: Properties,
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub create_time_since_epoch: Option<i64>,
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub last_update_time_since_epoch: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Unknown,
    DeclaredOutput,
    DeclaredInput,
    Input,
    Output,
    InternalInput,
    InternalOutput,
    PendingOutput,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<i64>,
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<i64>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, with = "int64::option", skip_serializing_if = "Option::is_none")]
    pub milliseconds_since_epoch: Option<i64>,
}

impl Event {
    pub fn for_artifact(event_type: EventType, artifact_id: i64) -> Self {
        Self {
            artifact_id: Some(artifact_id),
            execution_id: None,
            event_type,
            milliseconds_since_epoch: None,
        }
    }
}
