use super::phase::Phase;
use launcher_common::object_store::StoreError;
use launcher_common::resolver::ResolveError;
use launcher_common::runtime_info::RuntimeInfoError;
use launcher_common::storage_root::StorageRootError;
use launcher_metadata::MetadataError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

#[derive(Debug)]
pub enum LaunchError {
    /// A required option was empty after all config layers were merged
    MissingOption(&'static str),

    StorageRoot(StorageRootError),
    RuntimeInfo(RuntimeInfoError),
    Resolve(ResolveError),
    Store(StoreError),
    Metadata(MetadataError),

    /// Local file or directory operation outside of an object store copy
    Io { path: PathBuf, source: io::Error },

    /// Failed to serialize an artifact record for its sink file
    Encode(serde_json::Error),

    /// Output artifact reached upload without a planned URI
    Unresolved(String),

    EmptyCommand,

    Spawn { program: String, source: io::Error },

    ChildFailed { program: String, status: ExitStatus },

    /// Wraps an error with the artifact it happened on
    Artifact { name: String, source: Box<LaunchError> },
}

impl LaunchError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LaunchError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn for_artifact(name: &str, error: impl Into<LaunchError>) -> Self {
        LaunchError::Artifact {
            name: name.to_string(),
            source: Box::new(error.into()),
        }
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::MissingOption(option) => write!(f, "Must specify {}", option),
            LaunchError::StorageRoot(e) => write!(f, "{}", e),
            LaunchError::RuntimeInfo(e) => write!(f, "{}", e),
            LaunchError::Resolve(e) => write!(f, "{}", e),
            LaunchError::Store(e) => write!(f, "{}", e),
            LaunchError::Metadata(e) => write!(f, "Metadata request failed: {}", e),
            LaunchError::Io { path, source } => write!(f, "{:?}: {}", path, source),
            LaunchError::Encode(e) => write!(f, "Failed to serialize artifact record: {}", e),
            LaunchError::Unresolved(name) => {
                write!(f, "Output artifact {:?} has no resolved URI", name)
            }
            LaunchError::EmptyCommand => write!(f, "No command given to run"),
            LaunchError::Spawn { program, source } => {
                write!(f, "Failed to start {:?}: {}", program, source)
            }
            LaunchError::ChildFailed { program, status } => {
                write!(f, "Command {:?} failed: {}", program, status)
            }
            LaunchError::Artifact { name, source } => {
                write!(f, "artifact {:?}: {}", name, source)
            }
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::StorageRoot(e) => Some(e),
            LaunchError::RuntimeInfo(e) => Some(e),
            LaunchError::Resolve(e) => Some(e),
            LaunchError::Store(e) => Some(e),
            LaunchError::Metadata(e) => Some(e),
            LaunchError::Io { source, .. } => Some(source),
            LaunchError::Encode(e) => Some(e),
            LaunchError::Spawn { source, .. } => Some(source),
            LaunchError::Artifact { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<StorageRootError> for LaunchError {
    fn from(error: StorageRootError) -> Self {
        LaunchError::StorageRoot(error)
    }
}

impl From<RuntimeInfoError> for LaunchError {
    fn from(error: RuntimeInfoError) -> Self {
        LaunchError::RuntimeInfo(error)
    }
}

impl From<ResolveError> for LaunchError {
    fn from(error: ResolveError) -> Self {
        LaunchError::Resolve(error)
    }
}

impl From<StoreError> for LaunchError {
    fn from(error: StoreError) -> Self {
        LaunchError::Store(error)
    }
}

impl From<MetadataError> for LaunchError {
    fn from(error: MetadataError) -> Self {
        LaunchError::Metadata(error)
    }
}

impl From<serde_json::Error> for LaunchError {
    fn from(error: serde_json::Error) -> Self {
        LaunchError::Encode(error)
    }
}

/// A launch that stopped in `phase`. Nothing after `phase` was attempted.
#[derive(Debug)]
pub struct LaunchFailure {
    pub phase: Phase,
    pub error: LaunchError,
}

impl fmt::Display for LaunchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.error)
    }
}

impl std::error::Error for LaunchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
