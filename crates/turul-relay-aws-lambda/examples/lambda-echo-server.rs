//! Echo application behind the Lambda relay
//!
//! - HTTP: answers every request with a JSON description of it
//! - WebSocket: accepts every connection and echoes each frame back
//! - Lifespan: completes startup and shutdown
//!
//! Configuration comes from `RELAY_*` environment variables (see
//! `RelayConfig::from_env`). WebSocket routes need `RELAY_DSN`, e.g.
//! `dynamodb://relay-connections?region=us-east-1`.
//!
//! Usage:
//! ```bash
//! cargo lambda build --package turul-relay-aws-lambda --bin lambda-echo-server
//! cargo lambda watch --package turul-relay-aws-lambda --bin lambda-echo-server
//! ```

use serde_json::json;
use tracing::info;
use turul_relay_aws_lambda::{LambdaRelayBuilder, RelayConfig};
use turul_relay_protocol::prelude::*;

async fn echo(scope: Scope, mut inbound: Inbound, outbound: Outbound) -> Result<(), ApplicationError> {
    match scope {
        Scope::Lifespan(_) => {
            while let Some(event) = inbound.receive().await {
                match event {
                    InboundEvent::LifespanStartup => {
                        info!("Echo application starting");
                        outbound.send(OutboundMessage::LifespanStartupComplete).await?;
                    }
                    InboundEvent::LifespanShutdown => {
                        outbound.send(OutboundMessage::LifespanShutdownComplete).await?;
                        break;
                    }
                    _ => {}
                }
            }
        }
        Scope::Http(http) => {
            let Some(InboundEvent::HttpRequest { body, .. }) = inbound.receive().await else {
                return Ok(());
            };

            let reply = json!({
                "method": http.method,
                "path": http.path,
                "query": http.query_string,
                "body": String::from_utf8_lossy(&body),
            });

            outbound
                .send(OutboundMessage::response_start(
                    200,
                    vec![("content-type".into(), "application/json".into())],
                ))
                .await?;
            outbound
                .send(OutboundMessage::response_body(reply.to_string()))
                .await?;
        }
        Scope::WebSocket(_) => {
            while let Some(event) = inbound.receive().await {
                match event {
                    InboundEvent::WebSocketConnect => {
                        outbound.send(OutboundMessage::accept()).await?;
                    }
                    InboundEvent::WebSocketReceive(frame) => {
                        outbound.send(OutboundMessage::WebSocketSend(frame)).await?;
                    }
                    InboundEvent::WebSocketDisconnect { .. } => break,
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    // JSON logs inside Lambda, readable ones locally
    if std::env::var("AWS_EXECUTION_ENV").is_ok() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(false)
            .without_time()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(false)
            .init();
    }

    let relay = LambdaRelayBuilder::new(application_fn(echo))
        .config(RelayConfig::from_env()?)
        .connect_hook(|connection_id| {
            info!("Connection opened: {}", connection_id);
            Ok(())
        })
        .disconnect_hook(|connection_id| {
            info!("Connection closed: {}", connection_id);
            Ok(())
        })
        .build()?;

    info!("Echo relay ready");
    relay.run().await
}
