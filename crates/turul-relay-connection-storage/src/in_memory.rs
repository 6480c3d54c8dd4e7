//! In-Memory Connection Storage Implementation
//!
//! Records live in an `Arc<RwLock<HashMap>>`, so they survive only as long as
//! the warm Lambda container that holds them. Suitable for:
//! - Development and testing
//! - Single-container deployments where losing connections on cold start is fine

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{ConnectionRecord, ConnectionStorage, ConnectionStorageError};

/// In-memory storage for connection records
#[derive(Debug, Clone)]
pub struct InMemoryConnectionStorage {
    /// All records by connection id
    connections: Arc<RwLock<HashMap<String, ConnectionRecord>>>,
    /// Configuration
    config: InMemoryConfig,
}

/// Configuration for in-memory connection storage
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum records to keep (for memory management)
    pub max_connections: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_connections: 100_000,
        }
    }
}

impl Default for InMemoryConnectionStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnectionStorage {
    /// Create new in-memory connection storage with default configuration
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig::default())
    }

    /// Create new in-memory connection storage with custom configuration
    pub fn with_config(config: InMemoryConfig) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }
}

#[async_trait]
impl ConnectionStorage for InMemoryConnectionStorage {
    type Error = ConnectionStorageError;

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }

    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, Self::Error> {
        let connections = self.connections.read().await;
        Ok(connections.get(connection_id).cloned())
    }

    async fn put_connection(&self, record: ConnectionRecord) -> Result<(), Self::Error> {
        let mut connections = self.connections.write().await;

        if !connections.contains_key(&record.connection_id)
            && connections.len() >= self.config.max_connections
        {
            return Err(ConnectionStorageError::MaxConnectionsReached(
                self.config.max_connections,
            ));
        }

        debug!("Stored connection: {}", record.connection_id);
        connections.insert(record.connection_id.clone(), record);
        Ok(())
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<bool, Self::Error> {
        let mut connections = self.connections.write().await;
        let existed = connections.remove(connection_id).is_some();
        debug!("Deleted connection {} (existed: {})", connection_id, existed);
        Ok(existed)
    }
}
