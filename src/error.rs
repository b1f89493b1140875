//! Error types for the gdrive_client crate.

use thiserror::Error;

/// Coarse classification of a failure, independent of where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransportUnavailable,
    PermissionDenied,
    DeadlineExceeded,
    InvalidArgument,
    Aborted,
    NotFound,
    Unimplemented,
    Unknown,
}

/// Errors that can occur when interacting with Google Drive.
///
/// Errors are `Clone` so that an upload session can keep its last outcome
/// around for inspection after it has been returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriveError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("{operation} failed: {source}")]
    Operation {
        operation: String,
        #[source]
        source: Box<DriveError>,
    },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DriveError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriveError::TransportUnavailable(_) => ErrorKind::TransportUnavailable,
            DriveError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            DriveError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DriveError::Aborted(_) => ErrorKind::Aborted,
            DriveError::ApiError { status, .. } => kind_from_status(*status),
            DriveError::Io { kind, .. } => match kind {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                std::io::ErrorKind::TimedOut => ErrorKind::DeadlineExceeded,
                std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                    ErrorKind::InvalidArgument
                }
                _ => ErrorKind::Unknown,
            },
            DriveError::Operation { source, .. } => source.kind(),
            DriveError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// HTTP status reported by the remote side, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DriveError::ApiError { status, .. } => Some(*status),
            DriveError::Operation { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Tag the error with the name of the operation that was attempted.
    pub fn in_operation(self, operation: impl Into<String>) -> Self {
        DriveError::Operation {
            operation: operation.into(),
            source: Box::new(self),
        }
    }
}

/// Map an HTTP status code to an error kind.
pub fn kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::InvalidArgument,
        401 | 403 => ErrorKind::PermissionDenied,
        404 | 410 => ErrorKind::NotFound,
        408 | 504 => ErrorKind::DeadlineExceeded,
        409 | 412 => ErrorKind::Aborted,
        501 => ErrorKind::Unimplemented,
        429 | 500 | 502 | 503 => ErrorKind::TransportUnavailable,
        _ => ErrorKind::Unknown,
    }
}

impl From<std::io::Error> for DriveError {
    fn from(err: std::io::Error) -> Self {
        DriveError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DriveError {
    fn from(err: serde_json::Error) -> Self {
        DriveError::InvalidArgument(format!("malformed JSON: {}", err))
    }
}

impl From<reqwest::Error> for DriveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DriveError::DeadlineExceeded(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            DriveError::TransportUnavailable(err.to_string())
        } else {
            DriveError::Unknown(err.to_string())
        }
    }
}

impl From<jsonwebtoken::errors::Error> for DriveError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        DriveError::InvalidArgument(format!("cannot sign JWT assertion: {}", err))
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
