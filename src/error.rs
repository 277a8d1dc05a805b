//! Error types for the signal screening pipeline

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the signal screening pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    // Collaborator errors
    #[error("{service} request failed: {message}")]
    Dependency { service: String, message: String },

    #[error("{service} timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    #[error("No data for {0}")]
    NotFound(String),

    // Adaptation errors
    #[error("Insufficient history: {0}")]
    InsufficientHistory(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Build a dependency error for a named collaborator
    pub fn dependency(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Dependency {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Dependency { .. } | Error::Timeout { .. })
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_errors_are_retryable() {
        let err = Error::dependency("onchain", "503");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "onchain request failed: 503");

        let timeout = Error::Timeout {
            service: "honeypot".to_string(),
            timeout_ms: 50,
        };
        assert!(timeout.is_retryable());
    }

    #[test]
    fn test_config_error_not_dependency() {
        let err = Error::Config("bad".to_string());
        assert!(!err.is_retryable());
    }
}
