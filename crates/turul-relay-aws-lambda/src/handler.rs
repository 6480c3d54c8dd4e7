//! Lambda invocation dispatcher
//!
//! [`LambdaRelay`] turns one raw trigger event into one vendor reply:
//! classify the event, run the HTTP or WebSocket cycle inside the lifespan
//! scope, then encode the cycle result in the reply format of the trigger.

use std::fmt;
use std::sync::Arc;

use lambda_runtime::{Context, LambdaEvent, service_fn};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use turul_relay_connection_storage::{
    BoxedConnectionStorage, ConnectionStorageDsn, ConnectionStorageError, connect_storage,
};
use turul_relay_protocol::SharedApplication;

use crate::backend::{ConnectionHook, ConnectionPusher, WebSocketBackend};
use crate::builder::LambdaRelayBuilder;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::http::HttpCycle;
use crate::lifespan::LifespanCycle;
use crate::request::{CanonicalRequest, WsRequest};
use crate::response::{CycleResult, encode_reply};
use crate::trigger::classify;
use crate::websocket::WebSocketCycle;

pub(crate) struct RelayInner {
    pub(crate) app: SharedApplication,
    pub(crate) config: RelayConfig,
    pub(crate) dsn: Option<ConnectionStorageDsn>,
    /// Injected storage, or the DSN backend once connected
    pub(crate) storage: OnceCell<Arc<BoxedConnectionStorage>>,
    pub(crate) pusher: Option<Arc<dyn ConnectionPusher>>,
    pub(crate) connect_hook: Option<ConnectionHook>,
    pub(crate) disconnect_hook: Option<ConnectionHook>,
    #[cfg(feature = "apigateway")]
    pub(crate) sdk_config: OnceCell<aws_config::SdkConfig>,
}

/// Runs an application behind Lambda HTTP and WebSocket triggers
///
/// Cheap to clone; clones share the application, configuration and any
/// connected storage.
#[derive(Clone)]
pub struct LambdaRelay {
    inner: Arc<RelayInner>,
}

impl fmt::Debug for LambdaRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaRelay")
            .field("config", &self.inner.config)
            .field("dsn", &self.inner.dsn.as_ref().map(|dsn| dsn.to_string()))
            .field("pusher", &self.inner.pusher.is_some())
            .finish()
    }
}

impl LambdaRelay {
    /// Start building a relay for `app`
    pub fn builder(app: impl turul_relay_protocol::Application) -> LambdaRelayBuilder {
        LambdaRelayBuilder::new(app)
    }

    pub(crate) fn from_inner(inner: RelayInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    /// Handle one raw trigger event and return the vendor reply
    pub async fn handle(&self, event: Value, context: Context) -> Result<Value> {
        let (source, request) = classify(&event, &self.inner.config.api_gateway_base_path)?;
        debug!(
            request_id = %context.request_id,
            "Dispatching {:?} trigger",
            source
        );

        let lifespan = LifespanCycle::new(
            self.inner.app.clone(),
            self.inner.config.lifespan,
            self.inner.config.lifespan_timeout,
        );
        let result = lifespan.scope(|| self.dispatch(request)).await?;

        Ok(encode_reply(source, &result))
    }

    /// Serve invocations with the Lambda runtime until it shuts down
    pub async fn run(self) -> std::result::Result<(), lambda_runtime::Error> {
        info!("Starting Lambda relay (lifespan: {})", self.inner.config.lifespan);

        lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
            let relay = self.clone();
            async move {
                relay
                    .handle(event.payload, event.context)
                    .await
                    .map_err(lambda_runtime::Error::from)
            }
        }))
        .await
    }

    async fn dispatch(&self, request: CanonicalRequest) -> Result<CycleResult> {
        match request {
            CanonicalRequest::Http(request) => {
                HttpCycle::new(self.inner.app.clone(), &self.inner.config)
                    .run(request)
                    .await
            }
            CanonicalRequest::WebSocket(request) => {
                let backend = self.websocket_backend(&request).await?;
                WebSocketCycle::new(
                    self.inner.app.clone(),
                    &backend,
                    self.inner.config.exchange_timeout,
                )
                .run(request)
                .await
            }
        }
    }

    async fn websocket_backend(&self, request: &WsRequest) -> Result<WebSocketBackend> {
        let storage = self.storage().await?;
        let pusher = match &self.inner.pusher {
            Some(pusher) => pusher.clone(),
            None => self.default_pusher(request).await?,
        };

        Ok(WebSocketBackend::new(storage, pusher)
            .with_connect_hook(self.inner.connect_hook.clone())
            .with_disconnect_hook(self.inner.disconnect_hook.clone()))
    }

    async fn storage(&self) -> Result<Arc<BoxedConnectionStorage>> {
        if let Some(storage) = self.inner.storage.get() {
            return Ok(storage.clone());
        }

        let dsn = self.inner.dsn.as_ref().ok_or_else(|| {
            RelayError::Configuration(
                "WebSocket trigger received but no connection storage DSN is configured".to_string(),
            )
        })?;

        let storage = self
            .inner
            .storage
            .get_or_try_init(|| async {
                connect_storage(dsn).await.map_err(|err| match err {
                    ConnectionStorageError::InvalidDsn(_)
                    | ConnectionStorageError::BackendNotEnabled(_) => {
                        RelayError::Configuration(err.to_string())
                    }
                    other => RelayError::Storage(other),
                })
            })
            .await?;

        Ok(storage.clone())
    }

    #[cfg(feature = "apigateway")]
    async fn default_pusher(&self, request: &WsRequest) -> Result<Arc<dyn ConnectionPusher>> {
        use aws_config::{BehaviorVersion, Region};

        let endpoint_url = self
            .inner
            .config
            .api_gateway_endpoint_url
            .clone()
            .or_else(|| request.endpoint_url.clone())
            .ok_or_else(|| {
                RelayError::Configuration(
                    "no API Gateway endpoint: the trigger has no domainName/stage and no override is configured"
                        .to_string(),
                )
            })?;

        let sdk_config = self
            .inner
            .sdk_config
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.inner.config.api_gateway_region {
                    loader = loader.region(Region::new(region.clone()));
                }
                loader.load().await
            })
            .await;

        Ok(Arc::new(crate::push::ApiGatewayPusher::new(
            sdk_config,
            endpoint_url,
        )))
    }

    #[cfg(not(feature = "apigateway"))]
    async fn default_pusher(&self, _request: &WsRequest) -> Result<Arc<dyn ConnectionPusher>> {
        Err(RelayError::Configuration(
            "no WebSocket pusher configured; enable the `apigateway` feature or provide one"
                .to_string(),
        ))
    }
}
