//! Plans every local path and remote URI of a launch and registers the matching placeholders.
//!
//! Nothing here touches the object store: inputs are only planned, the byte copies are left to
//! the caller. The only I/O is reading the input artifact side-channel files.

use crate::constants::{DEFAULT_INPUT_STAGING_ROOT, DEFAULT_OUTPUT_STAGING_ROOT, STAGED_FILE_NAME};
use crate::placeholder::{Placeholder, PlaceholderMap};
use crate::runtime_info::RuntimeInfo;
use crate::storage_root::StorageRoot;
use crate::types::Artifact;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug)]
pub enum ResolveError {
    /// An artifact name that would not stay inside its staging root
    InvalidArtifactName { name: String },

    /// An input artifact was declared without a side-channel file
    MissingArtifactFile { name: String },

    /// The side-channel file could not be read
    ReadArtifactFile { name: String, source: io::Error },

    /// The side-channel file does not hold an artifact record
    DecodeArtifactFile {
        name: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::InvalidArtifactName { name } => {
                write!(f, "Invalid artifact name {:?}", name)
            }
            ResolveError::MissingArtifactFile { name } => {
                write!(f, "Missing input artifact metadata file for input: {:?}", name)
            }
            ResolveError::ReadArtifactFile { name, source } => write!(
                f,
                "Failed to read input artifact metadata file for {:?}: {}",
                name, source
            ),
            ResolveError::DecodeArtifactFile { name, source } => write!(
                f,
                "Failed to unmarshal input artifact metadata for {:?}: {}",
                name, source
            ),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::InvalidArtifactName { .. } => None,
            ResolveError::MissingArtifactFile { .. } => None,
            ResolveError::ReadArtifactFile { source, .. } => Some(source),
            ResolveError::DecodeArtifactFile { source, .. } => Some(source),
        }
    }
}

/// How final remote keys of output artifacts are laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputKeyLayout {
    /// `<pipeline>/<run>/<task>/data` for every output artifact of the task. Several output
    /// artifacts of one task therefore share, and overwrite, a single object.
    #[default]
    SharedTaskKey,

    /// `<pipeline>/<run>/<task>/<artifact>/data`
    PerArtifact,
}

/// Local directories the launcher stages artifact bytes under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingLayout {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub output_keys: OutputKeyLayout,
}

impl Default for StagingLayout {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from(DEFAULT_INPUT_STAGING_ROOT),
            output_root: PathBuf::from(DEFAULT_OUTPUT_STAGING_ROOT),
            output_keys: OutputKeyLayout::default(),
        }
    }
}

impl StagingLayout {
    pub fn input_path(&self, name: &str) -> Result<PathBuf, ResolveError> {
        staged_path(&self.input_root, name)
    }

    pub fn output_path(&self, name: &str) -> Result<PathBuf, ResolveError> {
        staged_path(&self.output_root, name)
    }
}

/// `<root>/<name>/data`. Names must be relative and free of `.`/`..` so the path stays
/// under `root`.
fn staged_path(root: &Path, name: &str) -> Result<PathBuf, ResolveError> {
    let relative = Path::new(name);
    let is_plain = !name.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !is_plain {
        return Err(ResolveError::InvalidArtifactName {
            name: name.to_string(),
        });
    }
    Ok(root.join(relative).join(STAGED_FILE_NAME))
}

/// Identity of the task being launched, used to address its outputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskIdentity {
    pub pipeline_name: String,
    pub pipeline_run_id: String,
    pub pipeline_task_id: String,
}

pub struct PlaceholderResolver<'a> {
    storage_root: &'a StorageRoot,
    task: &'a TaskIdentity,
    layout: &'a StagingLayout,
}

impl<'a> PlaceholderResolver<'a> {
    pub fn new(
        storage_root: &'a StorageRoot,
        task: &'a TaskIdentity,
        layout: &'a StagingLayout,
    ) -> Self {
        Self {
            storage_root,
            task,
            layout,
        }
    }

    /// Remote key the output artifact `name` is uploaded to.
    pub fn output_key(&self, name: &str) -> String {
        let task = self.task;
        match self.layout.output_keys {
            OutputKeyLayout::SharedTaskKey => format!(
                "{}/{}/{}/{}",
                task.pipeline_name, task.pipeline_run_id, task.pipeline_task_id, STAGED_FILE_NAME
            ),
            OutputKeyLayout::PerArtifact => format!(
                "{}/{}/{}/{}/{}",
                task.pipeline_name,
                task.pipeline_run_id,
                task.pipeline_task_id,
                name,
                STAGED_FILE_NAME
            ),
        }
    }

    /// Reads every input artifact record, assigns its staging path and registers the input
    /// artifact and input parameter placeholders.
    pub fn resolve_inputs(
        &self,
        runtime_info: &mut RuntimeInfo,
        placeholders: &mut PlaceholderMap,
    ) -> Result<(), ResolveError> {
        for (name, input) in runtime_info.input_artifacts.iter_mut() {
            let file_input_path = input
                .file_input_path
                .as_deref()
                .filter(|path| !path.is_empty())
                .ok_or_else(|| ResolveError::MissingArtifactFile { name: name.clone() })?;

            let local_path = self.layout.input_path(name)?;
            let artifact = read_artifact_file(name, Path::new(file_input_path))?;

            placeholders.insert(Placeholder::InputArtifactUri(name.clone()), artifact.uri());
            placeholders.insert(
                Placeholder::InputArtifactPath(name.clone()),
                local_path.to_string_lossy(),
            );

            input.artifact = Some(artifact);
            input.local_path = Some(local_path);
        }

        for (name, parameter) in &runtime_info.input_parameters {
            placeholders.insert(
                Placeholder::InputParameter(name.clone()),
                parameter.parameter_value.clone(),
            );
        }

        Ok(())
    }

    /// Assigns staging paths and final URIs of output artifacts and registers the output
    /// placeholders. Pure: creates no directories.
    pub fn resolve_outputs(
        &self,
        runtime_info: &mut RuntimeInfo,
        placeholders: &mut PlaceholderMap,
    ) -> Result<(), ResolveError> {
        for (name, parameter) in &runtime_info.output_parameters {
            placeholders.insert(
                Placeholder::OutputParameterFile(name.clone()),
                parameter.file_output_path.clone(),
            );
        }

        for (name, output) in runtime_info.output_artifacts.iter_mut() {
            let local_path = self.layout.output_path(name)?;
            let uri = self.storage_root.uri_for(&self.output_key(name));

            placeholders.insert(
                Placeholder::OutputArtifactPath(name.clone()),
                local_path.to_string_lossy(),
            );
            placeholders.insert(Placeholder::OutputArtifactUri(name.clone()), uri.clone());

            output.local_path = Some(local_path);
            output.uri = Some(uri);
        }

        Ok(())
    }
}

fn read_artifact_file(name: &str, path: &Path) -> Result<Artifact, ResolveError> {
    let content = std::fs::read(path).map_err(|source| ResolveError::ReadArtifactFile {
        name: name.to_string(),
        source,
    })?;
    serde_json::from_slice(&content).map_err(|source| ResolveError::DecodeArtifactFile {
        name: name.to_string(),
        source,
    })
}
