//! Error types shared by hosts and applications

use thiserror::Error;

/// The other side of the host/application channel has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("application channel closed")]
pub struct ChannelClosed;

/// Errors raised by an application while handling a scope
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Application-defined failure
    #[error("{0}")]
    Message(String),

    /// The host stopped listening before the application finished
    #[error(transparent)]
    Channel(#[from] ChannelClosed),

    /// The application does not handle this scope type (e.g. no lifespan support)
    #[error("Unsupported scope: {0}")]
    UnsupportedScope(String),

    /// The application task panicked or was cancelled
    #[error("Application task failed: {0}")]
    Panicked(String),

    /// Any other boxed error
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ApplicationError {
    /// Create an application error from a message
    pub fn msg(message: impl Into<String>) -> Self {
        ApplicationError::Message(message.into())
    }
}
