//! # Connection Storage for turul-relay
//!
//! **Persisted WebSocket connection records, shared across Lambda invocations.**
//!
//! A WebSocket gateway delivers connect, message and disconnect as separate
//! invocations, possibly on different containers. The scope captured when a
//! connection is accepted is stored here and replayed to the application on
//! every later event for that connection id.
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! turul-relay-connection-storage = "0.1"
//!
//! # Optional features for different backends
//! turul-relay-connection-storage = { version = "0.1", features = ["sqlite"] }
//! turul-relay-connection-storage = { version = "0.1", features = ["postgres"] }
//! turul-relay-connection-storage = { version = "0.1", features = ["dynamodb"] }
//! ```
//!
//! ## Selecting a backend
//!
//! ```rust,no_run
//! use turul_relay_connection_storage::{ConnectionStorage, ConnectionStorageDsn, connect_storage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dsn: ConnectionStorageDsn = "memory://".parse()?;
//! let storage = connect_storage(&dsn).await?;
//! assert!(storage.get_connection("never-seen").await?.is_none());
//! # Ok(())
//! # }
//! ```

// Core trait and types
mod traits;
/// Connection storage trait, record type and unified error
pub use traits::*;

// Implementations
pub mod dsn;
pub mod in_memory;
pub mod prelude;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

pub use dsn::{ConnectionStorageDsn, connect_storage};
pub use in_memory::{InMemoryConfig, InMemoryConnectionStorage};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConfig, SqliteConnectionStorage, SqliteError};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresConnectionStorage, PostgresError};

#[cfg(feature = "dynamodb")]
pub use dynamodb::{DynamoDbConfig, DynamoDbConnectionStorage, DynamoDbError};

/// Convenience type alias for connection storage results
pub type StorageResult<T> = std::result::Result<T, ConnectionStorageError>;
