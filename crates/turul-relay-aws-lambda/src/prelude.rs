//! # AWS Lambda Relay Prelude
//!
//! ```rust
//! use turul_relay_aws_lambda::prelude::*;
//! ```

pub use crate::backend::{ConnectionPusher, HookError, PushError};
pub use crate::builder::LambdaRelayBuilder;
pub use crate::config::{LifespanMode, RelayConfig};
pub use crate::error::{RelayError, Result};
pub use crate::handler::LambdaRelay;

#[cfg(feature = "apigateway")]
pub use crate::push::ApiGatewayPusher;

// Re-export protocol types
pub use turul_relay_protocol::prelude::*;

// Lambda runtime types commonly used
pub use lambda_runtime::{Context as LambdaContext, Error as LambdaError};
