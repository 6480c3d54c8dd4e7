//! # Application Gateway Protocol Prelude
//!
//! ```rust
//! use turul_relay_protocol::prelude::*;
//! ```

pub use crate::application::{Application, SharedApplication, application_fn};
pub use crate::channel::{Inbound, Outbound};
pub use crate::error::{ApplicationError, ChannelClosed};
pub use crate::message::{Frame, InboundEvent, OutboundMessage};
pub use crate::scope::{Headers, HttpScope, LifespanScope, Scope, WebSocketScope, header_value};
