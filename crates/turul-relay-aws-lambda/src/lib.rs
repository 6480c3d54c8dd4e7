//! AWS Lambda host for application gateway protocol apps
//!
//! This crate runs an application written against `turul-relay-protocol`
//! behind AWS Lambda triggers, translating each invocation into the
//! protocol's message exchanges and back:
//!
//! - **HTTP**: API Gateway REST (v1), HTTP API (v2) and ALB events become a
//!   single `http` scope request; the streamed response is collected and
//!   encoded in the trigger's reply format
//! - **WebSocket**: API Gateway WebSocket `CONNECT`/`MESSAGE`/`DISCONNECT`
//!   events replay the connect handshake from a stored connection record;
//!   frames the application sends are pushed back through the Management API
//! - **Lifespan**: `lifespan.startup`/`lifespan.shutdown` wrap every
//!   invocation according to the configured mode (`auto`, `on`, `off`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use turul_relay_aws_lambda::{LambdaRelayBuilder, RelayConfig};
//! use turul_relay_protocol::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     let app = application_fn(|scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
//!         if let Scope::Http(_) = scope {
//!             let _request = inbound.receive().await;
//!             outbound
//!                 .send(OutboundMessage::response_start(
//!                     200,
//!                     vec![("content-type".into(), "application/json".into())],
//!                 ))
//!                 .await?;
//!             outbound
//!                 .send(OutboundMessage::response_body(r#"{"ok":true}"#))
//!                 .await?;
//!         }
//!         Ok::<(), ApplicationError>(())
//!     });
//!
//!     let relay = LambdaRelayBuilder::new(app)
//!         .config(RelayConfig::from_env()?)
//!         .build()?;
//!
//!     relay.run().await
//! }
//! ```

pub mod backend;
pub mod builder;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod lifespan;
pub mod prelude;
pub mod request;
pub mod response;
pub mod trigger;
pub mod websocket;

#[cfg(feature = "apigateway")]
pub mod push;

/// WebSocket session backend: storage, pusher and hooks
pub use backend::{ConnectionHook, ConnectionPusher, HookError, PushError, WebSocketBackend};
/// Builder for creating relays with fluent configuration API
pub use builder::LambdaRelayBuilder;
/// Relay configuration and lifespan modes
pub use config::{LifespanMode, RelayConfig};
/// Relay error types and result aliases
pub use error::{RelayError, Result};
/// Invocation dispatcher
pub use handler::LambdaRelay;
pub use http::HttpCycle;
pub use lifespan::{LifespanCycle, LifespanState};
pub use request::{CanonicalRequest, HttpRequest, MessageType, WsRequest};
pub use response::{CycleResult, encode_reply};
pub use trigger::{TriggerSource, classify};
pub use websocket::WebSocketCycle;

#[cfg(feature = "apigateway")]
pub use push::ApiGatewayPusher;
