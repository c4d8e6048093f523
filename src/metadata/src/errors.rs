use std::fmt;

#[derive(Debug)]
pub enum MetadataError {
    /// The request never got a response
    Transport(reqwest::Error),

    NotFound(String),

    AlreadyExists(String),

    /// The service answered with a non-2XX status
    Status { status: u16, body: String },

    Serialization(serde_json::Error),

    /// An artifact schema without a usable type title
    Schema(String),

    /// The service answered with something a single-item call cannot produce
    Invariant(String),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Transport(e) => write!(f, "Metadata request failed: {}", e),
            MetadataError::NotFound(message) => write!(f, "Not found: {}", message),
            MetadataError::AlreadyExists(message) => write!(f, "Already exists: {}", message),
            MetadataError::Status { status, body } => {
                write!(f, "Metadata service error {}: {}", status, body)
            }
            MetadataError::Serialization(e) => {
                write!(f, "Failed to encode or decode metadata message: {}", e)
            }
            MetadataError::Schema(message) => write!(f, "Invalid artifact schema: {}", message),
            MetadataError::Invariant(message) => {
                write!(f, "Unexpected metadata service response: {}", message)
            }
        }
    }
}

impl std::error::Error for MetadataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetadataError::Transport(e) => Some(e),
            MetadataError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MetadataError {
    fn from(err: reqwest::Error) -> Self {
        MetadataError::Transport(err)
    }
}

impl From<serde_json::Error> for MetadataError {
    fn from(err: serde_json::Error) -> Self {
        MetadataError::Serialization(err)
    }
}

impl MetadataError {
    /// Maps an HTTP status and body the way the RPC gateway reports errors.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => MetadataError::NotFound(body),
            409 => MetadataError::AlreadyExists(body),
            _ => MetadataError::Status { status, body },
        }
    }

    /// HTTP status the mock gateway answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            MetadataError::NotFound(_) => 404,
            MetadataError::AlreadyExists(_) => 409,
            MetadataError::Status { status, .. } => *status,
            MetadataError::Serialization(_) | MetadataError::Schema(_) => 400,
            MetadataError::Transport(_) | MetadataError::Invariant(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MetadataError::NotFound(_))
    }
}

pub type MetadataResult<T> = Result<T, MetadataError>;
