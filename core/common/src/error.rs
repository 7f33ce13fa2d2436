//! Common error types for ossnav.

use thiserror::Error;

/// Top-level error type for storage and configuration operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The bucket does not exist (or the top-level directory is missing).
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// The object key does not exist within the bucket.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Credentials were rejected by the backend.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The credentials are valid but lack permission for the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Any other backend failure, carrying the backend message.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed account or provider configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A local path does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A local path exists but is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport-level failure talking to a remote backend.
    #[error("Network error: {0}")]
    Network(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error reports something missing, remote or local.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::BucketNotFound(_) | Self::ObjectNotFound(_) | Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether this error came from a storage operation.
    ///
    /// `Configuration` is the only kind that is not.
    pub fn is_storage_error(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds() {
        assert!(Error::BucketNotFound("b".into()).is_not_found());
        assert!(Error::ObjectNotFound("k".into()).is_not_found());
        assert!(Error::NotFound("/tmp/x".into()).is_not_found());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_not_found());
        assert!(!Error::Storage("boom".into()).is_not_found());
    }

    #[test]
    fn test_configuration_is_not_storage() {
        assert!(!Error::Configuration("bad".into()).is_storage_error());
        assert!(Error::PermissionDenied("no".into()).is_storage_error());
    }

    #[test]
    fn test_display_carries_subject() {
        let err = Error::ObjectNotFound("docs/readme.md".into());
        assert_eq!(err.to_string(), "Object not found: docs/readme.md");
    }
}
