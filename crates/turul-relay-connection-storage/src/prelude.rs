//! # Connection Storage Prelude
//!
//! ```rust
//! use turul_relay_connection_storage::prelude::*;
//! ```

pub use crate::traits::{
    BoxedConnectionStorage, ConnectionRecord, ConnectionStorage, ConnectionStorageError,
};

pub use crate::dsn::{ConnectionStorageDsn, connect_storage};
pub use crate::in_memory::{InMemoryConfig, InMemoryConnectionStorage};
pub use crate::StorageResult;

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteConfig, SqliteConnectionStorage};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PostgresConfig, PostgresConnectionStorage};

#[cfg(feature = "dynamodb")]
pub use crate::dynamodb::{DynamoDbConfig, DynamoDbConnectionStorage};
