//! Typed inputs and outputs of one step, decoded from the `--runtime_info_json` payload.

use crate::types::{Artifact, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterType {
    Int,
    #[default]
    String,
    Double,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterType::Int => write!(f, "INT"),
            ParameterType::String => write!(f, "STRING"),
            ParameterType::Double => write!(f, "DOUBLE"),
        }
    }
}

impl ParameterType {
    /// Typed property value for a raw parameter. Values that do not parse under the declared
    /// type are kept as strings.
    pub fn value_of(&self, raw: &str) -> Value {
        let parsed = match self {
            ParameterType::Int => raw.trim().parse::<i64>().ok().map(Value::Int),
            ParameterType::Double => raw.trim().parse::<f64>().ok().map(Value::Double),
            ParameterType::String => None,
        };
        parsed.unwrap_or_else(|| Value::from(raw))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "InputParameterRepr")]
pub struct InputParameter {
    pub parameter_type: ParameterType,
    /// Opaque to the launcher; the step interprets it according to `parameter_type`.
    pub parameter_value: String,
}

// Parameters arrive either as full records or, from older compilers, as bare strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum InputParameterRepr {
    Bare(String),
    #[serde(rename_all = "camelCase")]
    Typed {
        #[serde(alias = "type")]
        parameter_type: ParameterType,
        #[serde(alias = "value")]
        parameter_value: String,
    },
}

impl From<InputParameterRepr> for InputParameter {
    fn from(repr: InputParameterRepr) -> Self {
        match repr {
            InputParameterRepr::Bare(parameter_value) => InputParameter {
                parameter_type: ParameterType::String,
                parameter_value,
            },
            InputParameterRepr::Typed {
                parameter_type,
                parameter_value,
            } => InputParameter {
                parameter_type,
                parameter_value,
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputArtifact {
    /// Side-channel file holding the serialized artifact record produced upstream.
    #[serde(default, alias = "sourceDescriptorPath")]
    pub file_input_path: Option<String>,

    #[serde(skip)]
    pub artifact: Option<Artifact>,

    /// `<input staging root>/<name>/data`, assigned during resolution.
    #[serde(skip)]
    pub local_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputParameter {
    #[serde(alias = "type")]
    pub parameter_type: ParameterType,
    #[serde(alias = "declaredSinkPath")]
    pub file_output_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputArtifact {
    #[serde(alias = "schema")]
    pub artifact_schema: String,

    /// Where the registered artifact record is written after a successful run.
    #[serde(alias = "declaredSinkPath")]
    pub file_output_path: String,

    #[serde(skip)]
    pub local_path: Option<PathBuf>,

    /// `<pipeline root>/<pipeline>/<run>/<task>/data`, assigned during resolution.
    #[serde(skip)]
    pub uri: Option<String>,
}

/// Runtime descriptor of a step. All four maps are present even when the payload omits them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeInfo {
    pub input_parameters: BTreeMap<String, InputParameter>,
    pub input_artifacts: BTreeMap<String, InputArtifact>,
    pub output_parameters: BTreeMap<String, OutputParameter>,
    pub output_artifacts: BTreeMap<String, OutputArtifact>,
}

#[derive(Debug)]
pub struct RuntimeInfoError(serde_json::Error);

impl fmt::Display for RuntimeInfoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to parse runtime info: {}", self.0)
    }
}

impl std::error::Error for RuntimeInfoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl RuntimeInfo {
    /// Decodes a runtime descriptor. A blank payload decodes to an empty descriptor.
    pub fn parse(json_encoded: &str) -> Result<Self, RuntimeInfoError> {
        if json_encoded.trim().is_empty() {
            return Ok(Self::default());
        }

        let runtime_info: RuntimeInfo =
            serde_json::from_str(json_encoded).map_err(RuntimeInfoError)?;
        tracing::debug!("Got runtime info: {:?}", runtime_info);
        Ok(runtime_info)
    }
}
