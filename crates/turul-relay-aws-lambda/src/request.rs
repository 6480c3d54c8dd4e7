//! Canonical request model
//!
//! Every trigger event is reduced to one of two shapes before any cycle runs.
//! Both carry the raw trigger so applications can reach vendor-specific fields.

use std::fmt;

use bytes::Bytes;
use serde_json::Value;

use turul_relay_protocol::{Frame, Headers, HttpScope, WebSocketScope, header_value};

/// The request a single invocation carries
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalRequest {
    Http(HttpRequest),
    WebSocket(WsRequest),
}

/// An HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    /// Decoded path with the configured base path removed
    pub path: String,
    /// Path exactly as the trigger supplied it
    pub raw_path: Option<String>,
    /// Lower-cased names, duplicates preserved in arrival order
    pub headers: Headers,
    /// Encoded query string without the leading `?`
    pub query_string: String,
    pub body: Bytes,
    pub source_ip: Option<String>,
    pub scheme: String,
    pub server: Option<(String, u16)>,
    pub root_path: String,
    pub trigger: Value,
}

impl HttpRequest {
    /// Build the HTTP scope handed to the application
    pub fn to_scope(&self) -> HttpScope {
        HttpScope {
            method: self.method.to_ascii_uppercase(),
            scheme: self.scheme.clone(),
            path: self.path.clone(),
            raw_path: self.raw_path.clone(),
            query_string: self.query_string.clone(),
            root_path: self.root_path.clone(),
            headers: self.headers.clone(),
            client: self.source_ip.clone().map(|ip| (ip, 0)),
            server: self.server.clone(),
            trigger: Some(self.trigger.clone()),
            ..HttpScope::default()
        }
    }
}

/// Which WebSocket route an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Connect,
    Message,
    Disconnect,
}

impl MessageType {
    /// Parse an API Gateway `eventType`
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "CONNECT" => Some(MessageType::Connect),
            "MESSAGE" => Some(MessageType::Message),
            "DISCONNECT" => Some(MessageType::Disconnect),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageType::Connect => "CONNECT",
            MessageType::Message => "MESSAGE",
            MessageType::Disconnect => "DISCONNECT",
        })
    }
}

/// A WebSocket event
#[derive(Debug, Clone, PartialEq)]
pub struct WsRequest {
    /// Never empty
    pub connection_id: String,
    pub message_type: MessageType,
    pub raw_body: Bytes,
    /// The trigger marked the body base64, so it is delivered as bytes
    pub is_binary: bool,
    pub headers: Headers,
    pub path: String,
    pub query_string: String,
    pub source_ip: Option<String>,
    /// Management API endpoint derived from the trigger (`https://{domainName}/{stage}`)
    pub endpoint_url: Option<String>,
    pub trigger: Value,
}

impl WsRequest {
    /// Build the WebSocket scope captured on connect
    pub fn to_scope(&self) -> WebSocketScope {
        let subprotocols = header_value(&self.headers, "sec-websocket-protocol")
            .map(|value| {
                value
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let server = header_value(&self.headers, "host").map(|host| (host.to_string(), 443));

        WebSocketScope {
            path: self.path.clone(),
            query_string: self.query_string.clone(),
            headers: self.headers.clone(),
            client: self.source_ip.clone().map(|ip| (ip, 0)),
            server,
            subprotocols,
            trigger: Some(self.trigger.clone()),
            ..WebSocketScope::default()
        }
    }

    /// The message body as a frame
    pub fn frame(&self) -> Frame {
        if self.is_binary {
            return Frame::Binary(self.raw_body.clone());
        }
        match std::str::from_utf8(&self.raw_body) {
            Ok(text) => Frame::Text(text.to_string()),
            Err(_) => Frame::Binary(self.raw_body.clone()),
        }
    }
}
