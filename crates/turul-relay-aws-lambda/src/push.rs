//! API Gateway Management API pusher
//!
//! Frames for a WebSocket API are delivered with `PostToConnection` against
//! the API's management endpoint, `https://{domainName}/{stage}`.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_apigatewaymanagement::Client;
use aws_sdk_apigatewaymanagement::error::DisplayErrorContext;
use aws_sdk_apigatewaymanagement::primitives::Blob;
use tracing::{debug, warn};

use turul_relay_protocol::Frame;

use crate::backend::{ConnectionPusher, PushError};

/// Pushes frames through the API Gateway Management API
#[derive(Debug, Clone)]
pub struct ApiGatewayPusher {
    client: Client,
    endpoint_url: String,
}

impl ApiGatewayPusher {
    /// Create a pusher for one management endpoint
    pub fn new(sdk_config: &SdkConfig, endpoint_url: impl Into<String>) -> Self {
        let endpoint_url = endpoint_url.into();
        let config = aws_sdk_apigatewaymanagement::config::Builder::from(sdk_config)
            .endpoint_url(&endpoint_url)
            .build();

        Self {
            client: Client::from_conf(config),
            endpoint_url,
        }
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

#[async_trait]
impl ConnectionPusher for ApiGatewayPusher {
    async fn push(&self, connection_id: &str, frame: Frame) -> Result<(), PushError> {
        let data = frame.into_bytes();
        debug!(
            "PostToConnection {} ({} bytes) via {}",
            connection_id,
            data.len(),
            self.endpoint_url
        );

        match self
            .client
            .post_to_connection()
            .connection_id(connection_id)
            .data(Blob::new(data.to_vec()))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_gone_exception())
                {
                    warn!("Connection {} is gone", connection_id);
                    return Err(PushError::Gone);
                }
                Err(PushError::Failed(DisplayErrorContext(&err).to_string()))
            }
        }
    }
}
