use crate::errors::{MetadataError, MetadataResult};
use yaml_rust2::{Yaml, YamlLoader};

/// Reads the artifact type name from the `title` field of an artifact schema.
pub fn artifact_type_title(schema: &str) -> MetadataResult<String> {
    let documents = YamlLoader::load_from_str(schema)
        .map_err(|e| MetadataError::Schema(format!("Failed to parse schema: {}", e)))?;

    documents
        .first()
        .and_then(|document| scalar_string(&document["title"]))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .ok_or_else(|| MetadataError::Schema(format!("No title in schema {:?}", schema)))
}

// plain scalars such as `title: 2024` are titles too
fn scalar_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(text) | Yaml::Real(text) => Some(text.clone()),
        Yaml::Integer(number) => Some(number.to_string()),
        Yaml::Boolean(flag) => Some(flag.to_string()),
        _ => None,
    }
}
