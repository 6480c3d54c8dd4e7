//! # Application Gateway Protocol
//!
//! The long-lived, message based protocol spoken between a host (the relay)
//! and an async application. An application is called once per connection
//! with a [`Scope`] describing that connection, reads [`InboundEvent`]s from
//! an [`Inbound`] queue and answers with [`OutboundMessage`]s on an
//! [`Outbound`] queue.
//!
//! Three scope types exist:
//!
//! - **lifespan**: `lifespan.startup` / `lifespan.shutdown` handshakes run once
//!   per host lifetime
//! - **http**: a single request/response exchange
//! - **websocket**: a connect handshake followed by receive/send frames
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use turul_relay_protocol::prelude::*;
//!
//! let app = application_fn(|scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
//!     if let Scope::Http(_) = scope {
//!         let _request = inbound.receive().await;
//!         outbound
//!             .send(OutboundMessage::response_start(200, vec![("content-type".into(), "text/plain".into())]))
//!             .await?;
//!         outbound.send(OutboundMessage::response_body("hello")).await?;
//!     }
//!     Ok::<(), ApplicationError>(())
//! });
//! # let _ = app;
//! ```

pub mod application;
pub mod channel;
pub mod error;
pub mod message;
pub mod prelude;
pub mod scope;

pub use application::{Application, ApplicationFn, SharedApplication, application_fn};
pub use channel::{HostChannel, HostStep, Inbound, Outbound, RunningApplication, channel, launch};
pub use error::{ApplicationError, ChannelClosed};
pub use message::{Frame, InboundEvent, OutboundMessage};
pub use scope::{
    Headers, HttpScope, LifespanScope, Scope, WebSocketScope, header_value, normalize_headers,
};

/// Version of the application gateway protocol implemented by this crate
pub const PROTOCOL_VERSION: &str = "3.0";
