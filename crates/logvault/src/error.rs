//! Error types for the storage and query engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the write path (storage, indexing, rotation, config).
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An I/O error tied to a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    PathIo {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configuration is invalid or unreadable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A batch with no records was submitted for storage.
    #[error("cannot store an empty batch")]
    EmptyBatch,

    /// A file pattern could not be compiled.
    #[error("invalid file pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl StoreError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PathIo {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the read-only query engine.
///
/// Partial corruption (unreadable segments, malformed index lines, dangling
/// references) is never an error; it is logged and skipped.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The free-text pattern is not a valid regular expression.
    #[error("invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The storage root has no index directory.
    #[error("no indexes available under {}", .0.display())]
    NoIndexes(PathBuf),
}

/// Result type alias for write-path operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(StoreError::EmptyBatch.to_string(), "cannot store an empty batch");

        let err = StoreError::Config("interval must be positive".to_string());
        assert_eq!(err.to_string(), "configuration error: interval must be positive");

        let err = StoreError::InvalidPattern {
            pattern: "a/".to_string(),
            reason: "empty component".to_string(),
        };
        assert_eq!(err.to_string(), "invalid file pattern 'a/': empty component");
    }

    #[test]
    fn path_io_includes_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StoreError::at("/tmp/segment.json", io_err);
        let msg = err.to_string();
        assert!(msg.contains("/tmp/segment.json"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StoreError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn query_error_from_regex() {
        let regex_err = regex::Regex::new("(unclosed").expect_err("pattern must be invalid");
        let err: QueryError = regex_err.into();
        assert!(err.to_string().starts_with("invalid regex pattern"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
        assert_send_sync::<QueryError>();
    }
}
