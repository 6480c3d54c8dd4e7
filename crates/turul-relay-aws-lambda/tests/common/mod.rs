//! Shared fixtures for relay integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use turul_relay_aws_lambda::{ConnectionPusher, LambdaRelayBuilder, PushError};
use turul_relay_connection_storage::{BoxedConnectionStorage, InMemoryConnectionStorage};
use turul_relay_protocol::prelude::*;

pub const DOMAIN_NAME: &str = "abc123.execute-api.us-east-1.amazonaws.com";

/// Records every pushed frame; optionally fails every push
#[derive(Default)]
pub struct RecordingPusher {
    frames: Mutex<Vec<(String, Frame)>>,
    gone: bool,
}

impl RecordingPusher {
    pub fn gone() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            gone: true,
        }
    }

    pub fn frames(&self) -> Vec<(String, Frame)> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionPusher for RecordingPusher {
    async fn push(&self, connection_id: &str, frame: Frame) -> Result<(), PushError> {
        if self.gone {
            return Err(PushError::Gone);
        }
        self.frames
            .lock()
            .unwrap()
            .push((connection_id.to_string(), frame));
        Ok(())
    }
}

/// Ordered log of what applications observed
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub fn memory_storage() -> Arc<BoxedConnectionStorage> {
    Arc::new(InMemoryConnectionStorage::new())
}

/// Builder with lifespan off and short timeouts
pub fn relay_builder(app: impl Application) -> LambdaRelayBuilder {
    LambdaRelayBuilder::new(app)
        .lifespan("off")
        .exchange_timeout(Duration::from_secs(5))
        .lifespan_timeout(Duration::from_secs(5))
}

pub fn context() -> lambda_runtime::Context {
    lambda_runtime::Context::default()
}

pub fn rest_event(method: &str, path: &str, body: Option<&str>) -> Value {
    json!({
        "resource": "/{proxy+}",
        "path": path,
        "httpMethod": method,
        "headers": {"Host": "api.example.com", "Accept": "*/*"},
        "multiValueHeaders": {"Host": ["api.example.com"], "Accept": ["*/*"]},
        "queryStringParameters": null,
        "multiValueQueryStringParameters": null,
        "requestContext": {
            "stage": "prod",
            "identity": {"sourceIp": "198.51.100.7"}
        },
        "body": body,
        "isBase64Encoded": false
    })
}

pub fn http_api_event(method: &str, raw_path: &str, raw_query: &str) -> Value {
    json!({
        "version": "2.0",
        "routeKey": "$default",
        "rawPath": raw_path,
        "rawQueryString": raw_query,
        "cookies": ["session=abc", "theme=dark"],
        "headers": {"host": "api.example.com", "content-type": "text/plain"},
        "requestContext": {
            "http": {
                "method": method,
                "path": raw_path,
                "protocol": "HTTP/1.1",
                "sourceIp": "203.0.113.5"
            },
            "stage": "$default"
        },
        "body": "hello",
        "isBase64Encoded": false
    })
}

pub fn alb_event(method: &str, path: &str) -> Value {
    json!({
        "requestContext": {
            "elb": {"targetGroupArn": "arn:aws:elasticloadbalancing:us-east-1:123456789012:targetgroup/relay/abc"}
        },
        "httpMethod": method,
        "path": path,
        "queryStringParameters": {},
        "headers": {"host": "relay.example.com", "x-forwarded-for": "192.0.2.10, 10.0.0.1"},
        "body": "",
        "isBase64Encoded": false
    })
}

pub fn ws_event(event_type: &str, connection_id: &str, body: Option<&str>) -> Value {
    json!({
        "requestContext": {
            "routeKey": "$default",
            "eventType": event_type,
            "connectionId": connection_id,
            "domainName": DOMAIN_NAME,
            "stage": "prod",
            "identity": {"sourceIp": "203.0.113.9"}
        },
        "headers": {"Host": DOMAIN_NAME, "Sec-WebSocket-Protocol": "chat"},
        "body": body,
        "isBase64Encoded": false
    })
}

/// Answers every HTTP request with `{"ok":true}`
pub fn json_app() -> impl Application {
    application_fn(|scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
        let Scope::Http(_) = scope else {
            return Err(ApplicationError::UnsupportedScope(scope.kind().into()));
        };
        let _ = inbound.receive().await;
        outbound
            .send(OutboundMessage::response_start(
                200,
                vec![("content-type".into(), "application/json".into())],
            ))
            .await?;
        outbound
            .send(OutboundMessage::response_body(r#"{"ok":true}"#))
            .await?;
        Ok::<(), ApplicationError>(())
    })
}

/// Accepts every connection and sends one text frame per comma separated
/// piece of each received text message
pub fn splitting_ws_app(log: EventLog) -> impl Application {
    application_fn(move |scope: Scope, mut inbound: Inbound, outbound: Outbound| {
        let log = log.clone();
        async move {
            let Scope::WebSocket(_) = scope else {
                return Err(ApplicationError::UnsupportedScope(scope.kind().into()));
            };
            while let Some(event) = inbound.receive().await {
                log.push(event.kind());
                match event {
                    InboundEvent::WebSocketConnect => {
                        outbound.send(OutboundMessage::accept()).await?;
                    }
                    InboundEvent::WebSocketReceive(Frame::Text(text)) => {
                        for piece in text.split(',') {
                            outbound.send(OutboundMessage::send_text(piece)).await?;
                        }
                    }
                    InboundEvent::WebSocketReceive(Frame::Binary(bytes)) => {
                        outbound.send(OutboundMessage::send_bytes(bytes)).await?;
                    }
                    InboundEvent::WebSocketDisconnect { code } => {
                        log.push(format!("code {}", code));
                        break;
                    }
                    _ => {}
                }
            }
            Ok::<(), ApplicationError>(())
        }
    })
}
