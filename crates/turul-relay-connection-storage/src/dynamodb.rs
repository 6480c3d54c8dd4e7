//! AWS DynamoDB Connection Storage Implementation
//!
//! The usual backend for WebSocket APIs served from Lambda: every invocation
//! for a connection may land on a different container, so records must live
//! outside the process. Items carry a `ttl` attribute so abandoned connections
//! age out even when no disconnect event ever arrives.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue, TableStatus};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{ConnectionRecord, ConnectionStorage, ConnectionStorageError};

/// Configuration for DynamoDB connection storage
#[derive(Debug, Clone)]
pub struct DynamoDbConfig {
    /// DynamoDB table name for connection records
    pub table_name: String,
    /// AWS region
    pub region: String,
    /// Endpoint override (DynamoDB Local, LocalStack)
    pub endpoint_url: Option<String>,
    /// Record TTL in minutes, refreshed on every write
    pub ttl_minutes: u64,
    /// Allow table creation if the table doesn't exist
    pub create_table_if_missing: bool,
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            table_name: "relay-connections".to_string(),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint_url: None,
            // API Gateway drops idle WebSocket connections after two hours
            ttl_minutes: 120,
            create_table_if_missing: false,
        }
    }
}

/// Errors that can occur with DynamoDB storage
#[derive(Error, Debug)]
pub enum DynamoDbError {
    #[error("AWS SDK error: {0}")]
    AwsError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid connection data: {0}")]
    InvalidData(String),
    #[error("DynamoDB table does not exist: {0}")]
    TableNotFound(String),
}

impl From<DynamoDbError> for ConnectionStorageError {
    fn from(err: DynamoDbError) -> Self {
        match err {
            DynamoDbError::AwsError(e) => ConnectionStorageError::AwsError(e),
            DynamoDbError::SerializationError(e) => {
                ConnectionStorageError::SerializationError(e.to_string())
            }
            DynamoDbError::InvalidData(e) => ConnectionStorageError::InvalidData(e),
            DynamoDbError::TableNotFound(e) => ConnectionStorageError::TableNotFound(e),
        }
    }
}

/// DynamoDB-backed connection storage
pub struct DynamoDbConnectionStorage {
    config: DynamoDbConfig,
    client: Client,
}

impl DynamoDbConnectionStorage {
    /// Create a new DynamoDB connection storage with default configuration
    pub async fn new() -> Result<Self, DynamoDbError> {
        Self::with_config(DynamoDbConfig::default()).await
    }

    /// Create a new DynamoDB connection storage with custom configuration
    pub async fn with_config(config: DynamoDbConfig) -> Result<Self, DynamoDbError> {
        info!(
            "Initializing DynamoDB connection storage with table: {} in region: {}",
            config.table_name, config.region
        );

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let client = Client::new(&loader.load().await);

        let storage = Self { config, client };
        storage.verify_table().await?;

        info!(
            "DynamoDB connection storage initialized successfully in region: {}",
            storage.config.region
        );
        Ok(storage)
    }

    /// Verify that the table exists, creating it when allowed
    async fn verify_table(&self) -> Result<(), DynamoDbError> {
        debug!("Verifying table: {}", self.config.table_name);

        match self
            .client
            .describe_table()
            .table_name(&self.config.table_name)
            .send()
            .await
        {
            Ok(output) => match output.table().and_then(|t| t.table_status()) {
                Some(TableStatus::Active) => {
                    info!("DynamoDB table '{}' is active and ready", self.config.table_name);
                    Ok(())
                }
                Some(status) => {
                    warn!(
                        "DynamoDB table '{}' is not active: {:?}",
                        self.config.table_name, status
                    );
                    self.wait_for_table_active().await
                }
                None => Err(DynamoDbError::TableNotFound(format!(
                    "Table '{}' status unknown",
                    self.config.table_name
                ))),
            },
            Err(_) if self.config.create_table_if_missing => {
                warn!(
                    "Table '{}' does not exist, attempting to create it",
                    self.config.table_name
                );
                self.create_table().await?;
                self.wait_for_table_active().await?;
                self.enable_ttl().await
            }
            Err(err) => {
                error!("Failed to describe table '{}': {}", self.config.table_name, err);
                Err(DynamoDbError::TableNotFound(self.config.table_name.clone()))
            }
        }
    }

    async fn create_table(&self) -> Result<(), DynamoDbError> {
        use aws_sdk_dynamodb::types::{
            AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
        };

        info!("Creating DynamoDB table: {}", self.config.table_name);

        let key_schema = KeySchemaElement::builder()
            .attribute_name("connection_id")
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| DynamoDbError::AwsError(e.to_string()))?;

        let attribute_definition = AttributeDefinition::builder()
            .attribute_name("connection_id")
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| DynamoDbError::AwsError(e.to_string()))?;

        self.client
            .create_table()
            .table_name(&self.config.table_name)
            .key_schema(key_schema)
            .attribute_definitions(attribute_definition)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|err| {
                DynamoDbError::AwsError(format!(
                    "Failed to create table '{}': {}",
                    self.config.table_name, err
                ))
            })?;

        info!("Successfully initiated table creation: {}", self.config.table_name);
        Ok(())
    }

    async fn enable_ttl(&self) -> Result<(), DynamoDbError> {
        use aws_sdk_dynamodb::types::TimeToLiveSpecification;

        let ttl_spec = TimeToLiveSpecification::builder()
            .attribute_name("ttl")
            .enabled(true)
            .build()
            .map_err(|e| DynamoDbError::AwsError(e.to_string()))?;

        self.client
            .update_time_to_live()
            .table_name(&self.config.table_name)
            .time_to_live_specification(ttl_spec)
            .send()
            .await
            .map_err(|err| {
                DynamoDbError::AwsError(format!(
                    "Failed to enable TTL on table '{}': {}",
                    self.config.table_name, err
                ))
            })?;

        info!("Enabled TTL on table: {}", self.config.table_name);
        Ok(())
    }

    async fn wait_for_table_active(&self) -> Result<(), DynamoDbError> {
        use tokio::time::{Duration, sleep};

        for attempt in 1..=30 {
            match self
                .client
                .describe_table()
                .table_name(&self.config.table_name)
                .send()
                .await
            {
                Ok(output) => {
                    if let Some(table) = output.table()
                        && let Some(TableStatus::Active) = table.table_status()
                    {
                        info!("Table '{}' is now active", self.config.table_name);
                        return Ok(());
                    }
                }
                Err(err) => {
                    warn!("Error checking table status on attempt {}: {}", attempt, err);
                }
            }

            debug!("Table not ready, waiting... (attempt {}/30)", attempt);
            sleep(Duration::from_secs(2)).await;
        }

        Err(DynamoDbError::AwsError(format!(
            "Table '{}' did not become active within 60 seconds",
            self.config.table_name
        )))
    }

    fn key(connection_id: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([(
            "connection_id".to_string(),
            AttributeValue::S(connection_id.to_string()),
        )])
    }

    fn record_to_item(
        &self,
        record: &ConnectionRecord,
    ) -> Result<HashMap<String, AttributeValue>, DynamoDbError> {
        let mut item = Self::key(&record.connection_id);
        item.insert(
            "scope".to_string(),
            AttributeValue::S(serde_json::to_string(&record.scope)?),
        );
        if let Some(endpoint_url) = &record.endpoint_url {
            item.insert(
                "endpoint_url".to_string(),
                AttributeValue::S(endpoint_url.clone()),
            );
        }
        item.insert(
            "created_at".to_string(),
            AttributeValue::N(record.created_at.to_string()),
        );
        item.insert(
            "last_activity".to_string(),
            AttributeValue::N(record.last_activity.to_string()),
        );

        // DynamoDB TTL is in epoch seconds
        let ttl = record.last_activity / 1000 + self.config.ttl_minutes * 60;
        item.insert("ttl".to_string(), AttributeValue::N(ttl.to_string()));

        Ok(item)
    }

    fn item_to_record(
        item: &HashMap<String, AttributeValue>,
    ) -> Result<ConnectionRecord, DynamoDbError> {
        let string_attr = |name: &str| -> Result<&String, DynamoDbError> {
            item.get(name)
                .and_then(|v| v.as_s().ok())
                .ok_or_else(|| DynamoDbError::InvalidData(format!("Missing or invalid {}", name)))
        };
        let number_attr = |name: &str| -> Result<u64, DynamoDbError> {
            item.get(name)
                .and_then(|v| v.as_n().ok())
                .and_then(|n| n.parse::<u64>().ok())
                .ok_or_else(|| DynamoDbError::InvalidData(format!("Missing or invalid {}", name)))
        };

        Ok(ConnectionRecord {
            connection_id: string_attr("connection_id")?.clone(),
            scope: serde_json::from_str(string_attr("scope")?)?,
            endpoint_url: item
                .get("endpoint_url")
                .and_then(|v| v.as_s().ok())
                .cloned(),
            created_at: number_attr("created_at")?,
            last_activity: number_attr("last_activity")?,
        })
    }
}

#[async_trait]
impl ConnectionStorage for DynamoDbConnectionStorage {
    type Error = ConnectionStorageError;

    fn backend_name(&self) -> &'static str {
        "DynamoDB"
    }

    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, Self::Error> {
        let output = self
            .client
            .get_item()
            .table_name(&self.config.table_name)
            .set_key(Some(Self::key(connection_id)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|err| {
                error!("Failed to get connection from DynamoDB: {}", err);
                ConnectionStorageError::DatabaseError(format!(
                    "Failed to get connection '{}': {}",
                    connection_id, err
                ))
            })?;

        match output.item() {
            Some(item) => Ok(Some(Self::item_to_record(item)?)),
            None => {
                debug!("Connection not found in DynamoDB: {}", connection_id);
                Ok(None)
            }
        }
    }

    async fn put_connection(&self, record: ConnectionRecord) -> Result<(), Self::Error> {
        let item = self.record_to_item(&record)?;

        self.client
            .put_item()
            .table_name(&self.config.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|err| {
                error!("Failed to store connection in DynamoDB: {}", err);
                ConnectionStorageError::DatabaseError(format!(
                    "Failed to store connection '{}': {}",
                    record.connection_id, err
                ))
            })?;

        debug!("Stored connection in DynamoDB: {}", record.connection_id);
        Ok(())
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<bool, Self::Error> {
        let output = self
            .client
            .delete_item()
            .table_name(&self.config.table_name)
            .set_key(Some(Self::key(connection_id)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|err| {
                error!("Failed to delete connection from DynamoDB: {}", err);
                ConnectionStorageError::DatabaseError(format!(
                    "Failed to delete connection '{}': {}",
                    connection_id, err
                ))
            })?;

        let existed = output.attributes().is_some_and(|attrs| !attrs.is_empty());
        debug!("Deleted connection {} (existed: {})", connection_id, existed);
        Ok(existed)
    }
}
