//! Fluent builder for [`LambdaRelay`]
//!
//! ```rust,no_run
//! use turul_relay_aws_lambda::LambdaRelayBuilder;
//! use turul_relay_protocol::prelude::*;
//!
//! # fn example() -> turul_relay_aws_lambda::Result<()> {
//! let app = application_fn(|_scope: Scope, _inbound: Inbound, _outbound: Outbound| async move {
//!     Ok::<(), ApplicationError>(())
//! });
//!
//! let relay = LambdaRelayBuilder::new(app)
//!     .lifespan("off")
//!     .dsn("memory://")
//!     .text_mime_types(["application/graphql"])
//!     .connect_hook(|connection_id| {
//!         tracing::info!("connected: {}", connection_id);
//!         Ok(())
//!     })
//!     .build()?;
//! # let _ = relay;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use turul_relay_connection_storage::{BoxedConnectionStorage, ConnectionStorageDsn};
use turul_relay_protocol::{Application, SharedApplication};

use crate::backend::{ConnectionHook, ConnectionPusher, HookError};
use crate::config::{LifespanMode, RelayConfig};
use crate::error::{RelayError, Result};
use crate::handler::{LambdaRelay, RelayInner};

/// Builder for [`LambdaRelay`]
pub struct LambdaRelayBuilder {
    app: SharedApplication,
    config: RelayConfig,
    /// Raw lifespan mode, validated in `build`
    lifespan: Option<String>,
    storage: Option<Arc<BoxedConnectionStorage>>,
    pusher: Option<Arc<dyn ConnectionPusher>>,
    connect_hook: Option<ConnectionHook>,
    disconnect_hook: Option<ConnectionHook>,
}

impl LambdaRelayBuilder {
    pub fn new(app: impl Application) -> Self {
        Self::from_shared(Arc::new(app))
    }

    /// Use an application that is already shared
    pub fn from_shared(app: SharedApplication) -> Self {
        Self {
            app,
            config: RelayConfig::default(),
            lifespan: None,
            storage: None,
            pusher: None,
            connect_hook: None,
            disconnect_hook: None,
        }
    }

    /// Replace the whole configuration (e.g. one read with [`RelayConfig::from_env`])
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self.lifespan = None;
        self
    }

    /// Lifespan mode as text: `auto`, `on` or `off`
    pub fn lifespan(mut self, mode: impl Into<String>) -> Self {
        self.lifespan = Some(mode.into());
        self
    }

    pub fn lifespan_mode(mut self, mode: LifespanMode) -> Self {
        self.config.lifespan = mode;
        self.lifespan = None;
        self
    }

    /// Extra content types returned as text, on top of the defaults
    pub fn text_mime_types<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.add_text_mime_types(mime_types);
        self
    }

    /// Connection storage DSN (`memory://`, `sqlite://…`, `postgres://…`, `dynamodb://…`)
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.config.dsn = Some(dsn.into());
        self
    }

    /// Use this storage instead of connecting one from the DSN
    pub fn storage(mut self, storage: Arc<BoxedConnectionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use this pusher instead of the API Gateway Management API
    pub fn pusher(mut self, pusher: Arc<dyn ConnectionPusher>) -> Self {
        self.pusher = Some(pusher);
        self
    }

    pub fn api_gateway_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.config.api_gateway_endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn api_gateway_region(mut self, region: impl Into<String>) -> Self {
        self.config.api_gateway_region = Some(region.into());
        self
    }

    /// Path prefix stripped from request paths
    pub fn api_gateway_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.config.api_gateway_base_path = base_path.into();
        self
    }

    /// Called with the connection id after the application accepts a connection
    pub fn connect_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.connect_hook = Some(Arc::new(hook));
        self
    }

    /// Called with the connection id before its record is deleted
    pub fn disconnect_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.disconnect_hook = Some(Arc::new(hook));
        self
    }

    pub fn lifespan_timeout(mut self, timeout: Duration) -> Self {
        self.config.lifespan_timeout = timeout;
        self
    }

    pub fn exchange_timeout(mut self, timeout: Duration) -> Self {
        self.config.exchange_timeout = timeout;
        self
    }

    /// Validate the configuration and build the relay
    pub fn build(self) -> Result<LambdaRelay> {
        let mut config = self.config;

        if let Some(mode) = &self.lifespan {
            config.lifespan = mode.parse()?;
        }

        let dsn = config
            .dsn
            .as_deref()
            .map(str::parse::<ConnectionStorageDsn>)
            .transpose()
            .map_err(|err| RelayError::Configuration(err.to_string()))?;

        if config.exchange_timeout.is_zero() || config.lifespan_timeout.is_zero() {
            return Err(RelayError::Configuration(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        tracing::debug!(
            "Building Lambda relay: lifespan={}, dsn={:?}, injected storage={}",
            config.lifespan,
            dsn.as_ref().map(|dsn| dsn.scheme()),
            self.storage.is_some()
        );

        Ok(LambdaRelay::from_inner(RelayInner {
            app: self.app,
            config,
            dsn,
            storage: OnceCell::new_with(self.storage),
            pusher: self.pusher,
            connect_hook: self.connect_hook,
            disconnect_hook: self.disconnect_hook,
            #[cfg(feature = "apigateway")]
            sdk_config: OnceCell::new(),
        }))
    }
}
