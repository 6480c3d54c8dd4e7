//! Connection Storage Trait and Record Types
//!
//! A WebSocket connection outlives the invocation that accepted it, so the
//! scope captured on connect is persisted as a [`ConnectionRecord`] and read
//! back by every later invocation for the same connection id:
//! - InMemory: Development, testing and single warm container use
//! - SQLite: Local persistence
//! - PostgreSQL: Shared persistence across instances
//! - DynamoDB: Lambda/serverless deployments

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use turul_relay_protocol::WebSocketScope;

/// Persisted state of one WebSocket connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Connection id assigned by the WebSocket gateway
    pub connection_id: String,
    /// Scope captured when the connection was accepted
    pub scope: WebSocketScope,
    /// Endpoint used to push frames back to the client, if known
    pub endpoint_url: Option<String>,
    /// Creation timestamp (Unix millis)
    pub created_at: u64,
    /// Last activity timestamp (Unix millis)
    pub last_activity: u64,
}

impl ConnectionRecord {
    /// Create a record for a freshly accepted connection
    pub fn new(
        connection_id: impl Into<String>,
        scope: WebSocketScope,
        endpoint_url: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis() as u64;
        Self {
            connection_id: connection_id.into(),
            scope,
            endpoint_url,
            created_at: now,
            last_activity: now,
        }
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = chrono::Utc::now().timestamp_millis() as u64;
    }
}

/// Core trait for connection storage backends.
///
/// Lookups, inserts and deletes are independent per key; no backend offers
/// cross-key transactions, and concurrent writes to the same connection id
/// are resolved by the backend (last write wins).
#[async_trait]
pub trait ConnectionStorage: Send + Sync {
    /// Error type for storage operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Get the backend name for logging and debugging
    fn backend_name(&self) -> &'static str;

    /// Look up a connection record
    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, Self::Error>;

    /// Insert or replace a connection record
    async fn put_connection(&self, record: ConnectionRecord) -> Result<(), Self::Error>;

    /// Delete a connection record. Returns whether a record existed, where the
    /// backend can tell; deleting an absent record is not an error.
    async fn delete_connection(&self, connection_id: &str) -> Result<bool, Self::Error>;
}

/// Unified error type for all connection storage backends
#[derive(Debug, thiserror::Error)]
pub enum ConnectionStorageError {
    #[error("Maximum connections limit reached: {0}")]
    MaxConnectionsReached(usize),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("AWS SDK error: {0}")]
    AwsError(String),

    #[error("DynamoDB table does not exist: {0}")]
    TableNotFound(String),

    #[error("Invalid connection data: {0}")]
    InvalidData(String),

    #[error("Invalid storage DSN: {0}")]
    InvalidDsn(String),

    #[error("Storage backend not enabled: {0}")]
    BackendNotEnabled(String),
}

impl From<serde_json::Error> for ConnectionStorageError {
    fn from(err: serde_json::Error) -> Self {
        ConnectionStorageError::SerializationError(err.to_string())
    }
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl From<sqlx::Error> for ConnectionStorageError {
    fn from(err: sqlx::Error) -> Self {
        ConnectionStorageError::DatabaseError(err.to_string())
    }
}

/// Type alias for boxed connection storage trait object with unified error type
pub type BoxedConnectionStorage = dyn ConnectionStorage<Error = ConnectionStorageError>;
