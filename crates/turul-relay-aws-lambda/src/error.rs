//! Error handling for the Lambda relay

use thiserror::Error;

use turul_relay_connection_storage::ConnectionStorageError;
use turul_relay_protocol::ApplicationError;

use crate::backend::{HookError, PushError};

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can end a relay invocation
#[derive(Error, Debug)]
pub enum RelayError {
    /// Invalid relay configuration or an unrecognized trigger event
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The application broke the message ordering rules of the protocol
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Lifespan startup failed (or is unsupported) with lifespan mode `on`
    #[error("Lifespan error: {0}")]
    Lifespan(String),

    /// A WebSocket message arrived for a connection with no stored record
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// Pushing a frame back to a WebSocket client failed
    #[error("Backend push error for connection {connection_id}: {source}")]
    BackendPush {
        connection_id: String,
        #[source]
        source: PushError,
    },

    /// The application failed after it had started responding
    #[error("Application error: {0}")]
    Application(#[from] ApplicationError),

    /// A bounded wait on the application elapsed
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// A connect or disconnect hook failed
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    /// Connection storage error
    #[error("Connection storage error: {0}")]
    Storage(#[from] ConnectionStorageError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    pub(crate) fn violation(message: impl Into<String>) -> Self {
        RelayError::ProtocolViolation(message.into())
    }
}
