//! CLI error types.

use std::fmt;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Flags were missing or contradictory.
    Usage(String),
    /// The requested index key does not exist.
    InvalidIndexType {
        /// The key that was asked for.
        given: String,
        /// Keys present in the index.
        valid: Vec<String>,
    },
    /// Invalid configuration.
    Config(String),
    /// A query could not run.
    Query(logvault::QueryError),
    /// The storage engine failed.
    Store(logvault::StoreError),
    /// Output formatting error.
    Format(String),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(msg) => write!(f, "usage error: {msg}"),
            Self::InvalidIndexType { given, valid } => write!(
                f,
                "invalid index type '{given}'; available index types: {}",
                valid.join(", ")
            ),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Query(e) => write!(f, "query error: {e}"),
            Self::Store(e) => write!(f, "storage error: {e}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Query(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<logvault::QueryError> for CliError {
    fn from(err: logvault::QueryError) -> Self {
        Self::Query(err)
    }
}

impl From<logvault::StoreError> for CliError {
    fn from(err: logvault::StoreError) -> Self {
        match err {
            logvault::StoreError::Config(msg) => Self::Config(msg),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_display_usage() {
        let err = CliError::Usage("missing --pattern".into());
        assert_eq!(err.to_string(), "usage error: missing --pattern");
    }

    #[test]
    fn cli_error_display_invalid_index_type() {
        let err = CliError::InvalidIndexType {
            given: "color".into(),
            valid: vec!["level".into(), "status".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid index type 'color'; available index types: level, status"
        );
    }

    #[test]
    fn store_config_error_becomes_config() {
        let err = CliError::from(logvault::StoreError::Config("bad interval".into()));
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.to_string(), "configuration error: bad interval");
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }
}
