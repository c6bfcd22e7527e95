//! Error types for build-connection
//!
//! This module defines the failure taxonomy surfaced by a connection. Errors
//! detected before a request is submitted are returned to the caller; errors
//! detected afterwards travel through [`ResultHandler::on_failure`].
//!
//! [`ResultHandler::on_failure`]: crate::protocol::ResultHandler::on_failure

use thiserror::Error;

/// Boxed cause reported by the build engine or a model transform
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for connection operations
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The connection has been stopped
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The requested model type cannot be built
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The build engine reported a failure
    #[error("Build failed: {source}")]
    BuildExecution {
        /// Failure reported by the engine
        #[source]
        source: Cause,
    },

    /// Anything else raised while serving a request
    #[error("Unexpected failure: {0}")]
    Unexpected(String),

    /// Another operation is pending and the queue policy rejects new ones
    #[error("Connection busy: {0}")]
    Busy(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias using ConnectionError
pub type Result<T> = std::result::Result<T, ConnectionError>;

impl ConnectionError {
    /// Wrap an engine-reported failure, keeping the original cause
    pub fn build_failure(cause: impl Into<Cause>) -> Self {
        ConnectionError::BuildExecution {
            source: cause.into(),
        }
    }

    /// Check whether the error was raised because the connection is stopped
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, ConnectionError::IllegalState(_))
    }

    /// Check whether the error reports an unsatisfiable request
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ConnectionError::UnsupportedOperation(_))
    }

    /// Check whether the error wraps an engine build failure
    pub fn is_build_failure(&self) -> bool {
        matches!(self, ConnectionError::BuildExecution { .. })
    }
}

impl From<serde_json::Error> for ConnectionError {
    fn from(err: serde_json::Error) -> Self {
        ConnectionError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ConnectionError {
    fn from(err: toml::de::Error) -> Self {
        ConnectionError::Config(err.to_string())
    }
}
