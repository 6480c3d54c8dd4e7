//! WebSocket session backend
//!
//! A [`WebSocketBackend`] bundles what a WebSocket cycle needs beyond the
//! application: the connection store, a pusher that delivers frames back to
//! clients, and optional connect/disconnect hooks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use turul_relay_connection_storage::{
    BoxedConnectionStorage, ConnectionRecord, ConnectionStorage, ConnectionStorageError,
};
use turul_relay_protocol::Frame;

/// Errors from pushing a frame to a client
#[derive(Error, Debug)]
pub enum PushError {
    /// The client is no longer connected
    #[error("connection is gone")]
    Gone,

    /// The push API rejected or failed the request
    #[error("push failed: {0}")]
    Failed(String),
}

/// Error returned by a connect or disconnect hook
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(pub String);

impl From<String> for HookError {
    fn from(message: String) -> Self {
        HookError(message)
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        HookError(message.to_string())
    }
}

/// Callback invoked with a connection id after a connect or disconnect handshake
pub type ConnectionHook = Arc<dyn Fn(&str) -> Result<(), HookError> + Send + Sync>;

/// Delivers frames to connected WebSocket clients
#[async_trait]
pub trait ConnectionPusher: Send + Sync {
    /// Push one frame to one connection. No retries.
    async fn push(&self, connection_id: &str, frame: Frame) -> Result<(), PushError>;
}

/// Store, pusher and hooks for one WebSocket invocation
#[derive(Clone)]
pub struct WebSocketBackend {
    storage: Arc<BoxedConnectionStorage>,
    pusher: Arc<dyn ConnectionPusher>,
    connect_hook: Option<ConnectionHook>,
    disconnect_hook: Option<ConnectionHook>,
}

impl fmt::Debug for WebSocketBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketBackend")
            .field("storage", &self.storage.backend_name())
            .field("connect_hook", &self.connect_hook.is_some())
            .field("disconnect_hook", &self.disconnect_hook.is_some())
            .finish()
    }
}

impl WebSocketBackend {
    pub fn new(storage: Arc<BoxedConnectionStorage>, pusher: Arc<dyn ConnectionPusher>) -> Self {
        Self {
            storage,
            pusher,
            connect_hook: None,
            disconnect_hook: None,
        }
    }

    pub fn with_connect_hook(mut self, hook: Option<ConnectionHook>) -> Self {
        self.connect_hook = hook;
        self
    }

    pub fn with_disconnect_hook(mut self, hook: Option<ConnectionHook>) -> Self {
        self.disconnect_hook = hook;
        self
    }

    pub async fn get(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, ConnectionStorageError> {
        self.storage.get_connection(connection_id).await
    }

    pub async fn put(&self, record: ConnectionRecord) -> Result<(), ConnectionStorageError> {
        self.storage.put_connection(record).await
    }

    /// Idempotent: deleting an absent record succeeds
    pub async fn delete(&self, connection_id: &str) -> Result<bool, ConnectionStorageError> {
        self.storage.delete_connection(connection_id).await
    }

    pub async fn push(&self, connection_id: &str, frame: Frame) -> Result<(), PushError> {
        debug!("Pushing {} byte frame to {}", frame.len(), connection_id);
        self.pusher.push(connection_id, frame).await
    }

    pub(crate) fn on_connect(&self, connection_id: &str) -> Result<(), HookError> {
        match &self.connect_hook {
            Some(hook) => hook(connection_id),
            None => Ok(()),
        }
    }

    pub(crate) fn on_disconnect(&self, connection_id: &str) -> Result<(), HookError> {
        match &self.disconnect_hook {
            Some(hook) => hook(connection_id),
            None => Ok(()),
        }
    }
}
