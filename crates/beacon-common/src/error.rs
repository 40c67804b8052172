//! Error types for Beacon
//!
//! One error enum shared by the store and the HTTP layer. Nothing is
//! retried inside the store; retry is the caller's responsibility.

use thiserror::Error;

/// Common result type for Beacon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Beacon
#[derive(Debug, Error)]
pub enum Error {
    #[error("store already initialized")]
    AlreadyInitialized,

    #[error("invalid announcement: {0}")]
    InvalidAnnouncement(String),

    #[error("announcement environment '{actual}' does not match '{expected}'")]
    WrongEnvironment { expected: String, actual: String },

    #[error("backing store error: {0}")]
    Storage(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a backing store error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Get the HTTP status code this error maps to
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidAnnouncement(_) | Self::WrongEnvironment { .. } => 400,

            // 500 Internal Server Error
            Self::AlreadyInitialized
            | Self::Codec(_)
            | Self::Schema(_)
            | Self::Configuration(_) => 500,

            // 503 Service Unavailable
            Self::Storage(_) | Self::Io(_) => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        let err = Error::WrongEnvironment {
            expected: "production".into(),
            actual: "testing".into(),
        };
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(Error::storage("timeout").http_status_code(), 503);
        assert_eq!(Error::AlreadyInitialized.http_status_code(), 500);
    }

    #[test]
    fn test_display() {
        let err = Error::WrongEnvironment {
            expected: "production".into(),
            actual: "testing".into(),
        };
        assert_eq!(
            err.to_string(),
            "announcement environment 'testing' does not match 'production'"
        );
    }
}
