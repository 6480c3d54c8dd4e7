//! SQLite Connection Storage Implementation
//!
//! File-backed connection records, for local runs and single-instance
//! deployments where records should survive a process restart.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info};

use crate::{ConnectionRecord, ConnectionStorage, ConnectionStorageError};

/// SQLite-specific error types
#[derive(Error, Debug)]
pub enum SqliteError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<SqliteError> for ConnectionStorageError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Database(e) => ConnectionStorageError::DatabaseError(e.to_string()),
            SqliteError::Connection(e) => ConnectionStorageError::ConnectionError(e),
            SqliteError::Migration(e) => ConnectionStorageError::MigrationError(e),
        }
    }
}

/// Configuration for SQLite connection storage
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file path (`:memory:` for an in-process database)
    pub database_path: PathBuf,
    /// Maximum number of database connections in the pool
    pub max_connections: u32,
    /// Create database file if it doesn't exist
    pub create_database_if_missing: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("relay_connections.db"),
            max_connections: 5,
            create_database_if_missing: true,
        }
    }
}

/// SQLite-backed connection storage implementation
pub struct SqliteConnectionStorage {
    pool: SqlitePool,
}

impl SqliteConnectionStorage {
    /// Create new SQLite connection storage with default configuration
    pub async fn new() -> Result<Self, SqliteError> {
        Self::with_config(SqliteConfig::default()).await
    }

    /// Create SQLite connection storage with custom configuration
    pub async fn with_config(config: SqliteConfig) -> Result<Self, SqliteError> {
        info!(
            "Initializing SQLite connection storage at {:?}",
            config.database_path
        );

        let in_memory = config.database_path.as_os_str() == ":memory:";
        if !in_memory
            && let Some(parent) = config.database_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                SqliteError::Connection(format!("Failed to create database directory: {}", e))
            })?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(config.create_database_if_missing);

        // An in-memory database exists per connection, so the pool must stay at one
        let max_connections = if in_memory { 1 } else { config.max_connections };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;

        info!("SQLite connection storage initialized successfully");
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), SqliteError> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                connection_id TEXT PRIMARY KEY,
                scope TEXT NOT NULL,
                endpoint_url TEXT,
                created_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SqliteError::Migration(e.to_string()))?;

        debug!("Database migrations completed");
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ConnectionRecord, ConnectionStorageError> {
        let scope_json: String = row.try_get("scope")?;
        Ok(ConnectionRecord {
            connection_id: row.try_get("connection_id")?,
            scope: serde_json::from_str(&scope_json)?,
            endpoint_url: row.try_get("endpoint_url")?,
            created_at: row.try_get::<i64, _>("created_at")? as u64,
            last_activity: row.try_get::<i64, _>("last_activity")? as u64,
        })
    }
}

#[async_trait]
impl ConnectionStorage for SqliteConnectionStorage {
    type Error = ConnectionStorageError;

    fn backend_name(&self) -> &'static str {
        "SQLite"
    }

    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, Self::Error> {
        let row = sqlx::query(
            "SELECT connection_id, scope, endpoint_url, created_at, last_activity FROM connections WHERE connection_id = ?",
        )
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn put_connection(&self, record: ConnectionRecord) -> Result<(), Self::Error> {
        let scope_json = serde_json::to_string(&record.scope)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO connections (connection_id, scope, endpoint_url, created_at, last_activity)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(&record.connection_id)
        .bind(scope_json)
        .bind(&record.endpoint_url)
        .bind(record.created_at as i64)
        .bind(record.last_activity as i64)
        .execute(&self.pool)
        .await?;

        debug!("Stored connection: {}", record.connection_id);
        Ok(())
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<bool, Self::Error> {
        let deleted = sqlx::query("DELETE FROM connections WHERE connection_id = ?")
            .bind(connection_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }
}
