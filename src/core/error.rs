use std::fmt;

use thiserror::Error;

use super::identifier::Identifier;

/// Addressing context attached to errors raised for a specific document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub bucket: String,
    pub scope: String,
    pub collection: String,
    pub key: String,
}

impl From<&Identifier> for ErrorContext {
    fn from(id: &Identifier) -> Self {
        Self {
            bucket: id.bucket().to_string(),
            scope: id.scope().to_string(),
            collection: id.collection().to_string(),
            key: id.key().to_string(),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.bucket, self.scope, self.collection, self.key
        )
    }
}

/// Closed classification of [`KvError`], used where only the kind matters
/// (replica attempt states, aggregate fan-out failures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NoCommands,
    TooManyCommands,
    FeatureNotAvailable,
    Encoding,
    Decoding,
    Timeout,
    CasMismatch,
    DocumentNotFound,
    DocumentExists,
    DocumentLocked,
    PathNotFound,
    PathExists,
    PathMismatch,
    Transport,
    TopologyUnavailable,
    NoReplicaSucceeded,
}

#[derive(Error, Debug, Clone)]
pub enum KvError {
    #[error("Invalid argument: {message} [{context}]")]
    InvalidArgument {
        message: String,
        context: ErrorContext,
    },

    #[error("No subdocument commands provided, at least one is required [{0}]")]
    NoCommands(ErrorContext),

    #[error("Too many subdocument commands, a maximum of {max} is allowed per request [{context}]")]
    TooManyCommands { max: usize, context: ErrorContext },

    #[error("Feature not available: {0}")]
    FeatureNotAvailable(String),

    #[error("Encoding failed: {message} [{context}]")]
    Encoding {
        message: String,
        context: ErrorContext,
    },

    #[error("Decoding failed: {0}")]
    Decoding(String),

    #[error("Operation timed out [{0}]")]
    Timeout(ErrorContext),

    #[error("CAS mismatch [{0}]")]
    CasMismatch(ErrorContext),

    #[error("Document not found [{0}]")]
    DocumentNotFound(ErrorContext),

    #[error("Document already exists [{0}]")]
    DocumentExists(ErrorContext),

    #[error("Document is locked [{0}]")]
    DocumentLocked(ErrorContext),

    #[error("Path '{path}' not found [{context}]")]
    PathNotFound { path: String, context: ErrorContext },

    #[error("Path '{path}' already exists [{context}]")]
    PathExists { path: String, context: ErrorContext },

    #[error("Path '{path}' does not match the document structure [{context}]")]
    PathMismatch { path: String, context: ErrorContext },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Topology unavailable: {0}")]
    TopologyUnavailable(String),

    #[error("No replica returned the document after {attempts} attempts, last error: {last}")]
    NoReplicaSucceeded { attempts: usize, last: Box<KvError> },
}

pub type Result<T> = std::result::Result<T, KvError>;

impl KvError {
    pub fn invalid_argument(message: impl Into<String>, id: &Identifier) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            context: id.into(),
        }
    }

    pub fn encoding(message: impl fmt::Display, id: &Identifier) -> Self {
        Self::Encoding {
            message: message.to_string(),
            context: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NoCommands(_) => ErrorKind::NoCommands,
            Self::TooManyCommands { .. } => ErrorKind::TooManyCommands,
            Self::FeatureNotAvailable(_) => ErrorKind::FeatureNotAvailable,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Decoding(_) => ErrorKind::Decoding,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::CasMismatch(_) => ErrorKind::CasMismatch,
            Self::DocumentNotFound(_) => ErrorKind::DocumentNotFound,
            Self::DocumentExists(_) => ErrorKind::DocumentExists,
            Self::DocumentLocked(_) => ErrorKind::DocumentLocked,
            Self::PathNotFound { .. } => ErrorKind::PathNotFound,
            Self::PathExists { .. } => ErrorKind::PathExists,
            Self::PathMismatch { .. } => ErrorKind::PathMismatch,
            Self::Transport(_) => ErrorKind::Transport,
            Self::TopologyUnavailable(_) => ErrorKind::TopologyUnavailable,
            Self::NoReplicaSucceeded { .. } => ErrorKind::NoReplicaSucceeded,
        }
    }

    /// Returns true for failures raised on the client before any dispatch.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidArgument
                | ErrorKind::NoCommands
                | ErrorKind::TooManyCommands
                | ErrorKind::FeatureNotAvailable
        )
    }
}

impl From<tokio::task::JoinError> for KvError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Transport(format!("dispatch task aborted: {}", err))
    }
}
