//! Inbound events (host → application) and outbound messages (application → host)

use bytes::Bytes;

use crate::scope::Headers;

/// A single WebSocket frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    /// Frame payload as raw bytes (UTF-8 for text frames)
    pub fn into_bytes(self) -> Bytes {
        match self {
            Frame::Text(text) => Bytes::from(text),
            Frame::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Events delivered by the host to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    LifespanStartup,
    LifespanShutdown,
    HttpRequest { body: Bytes, more_body: bool },
    HttpDisconnect,
    WebSocketConnect,
    WebSocketReceive(Frame),
    WebSocketDisconnect { code: u16 },
}

impl InboundEvent {
    /// Protocol name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::LifespanStartup => "lifespan.startup",
            InboundEvent::LifespanShutdown => "lifespan.shutdown",
            InboundEvent::HttpRequest { .. } => "http.request",
            InboundEvent::HttpDisconnect => "http.disconnect",
            InboundEvent::WebSocketConnect => "websocket.connect",
            InboundEvent::WebSocketReceive(_) => "websocket.receive",
            InboundEvent::WebSocketDisconnect { .. } => "websocket.disconnect",
        }
    }
}

/// Messages sent by the application back to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    LifespanStartupComplete,
    LifespanStartupFailed { message: String },
    LifespanShutdownComplete,
    LifespanShutdownFailed { message: String },
    HttpResponseStart { status: u16, headers: Headers },
    HttpResponseBody { body: Bytes, more_body: bool },
    WebSocketAccept { subprotocol: Option<String>, headers: Headers },
    WebSocketSend(Frame),
    WebSocketClose { code: u16, reason: Option<String> },
}

impl OutboundMessage {
    /// Protocol name of the message
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::LifespanStartupComplete => "lifespan.startup.complete",
            OutboundMessage::LifespanStartupFailed { .. } => "lifespan.startup.failed",
            OutboundMessage::LifespanShutdownComplete => "lifespan.shutdown.complete",
            OutboundMessage::LifespanShutdownFailed { .. } => "lifespan.shutdown.failed",
            OutboundMessage::HttpResponseStart { .. } => "http.response.start",
            OutboundMessage::HttpResponseBody { .. } => "http.response.body",
            OutboundMessage::WebSocketAccept { .. } => "websocket.accept",
            OutboundMessage::WebSocketSend(_) => "websocket.send",
            OutboundMessage::WebSocketClose { .. } => "websocket.close",
        }
    }

    /// `http.response.start` with the given status and headers
    pub fn response_start(status: u16, headers: Headers) -> Self {
        OutboundMessage::HttpResponseStart { status, headers }
    }

    /// Final `http.response.body` chunk
    pub fn response_body(body: impl Into<Bytes>) -> Self {
        OutboundMessage::HttpResponseBody {
            body: body.into(),
            more_body: false,
        }
    }

    /// Intermediate `http.response.body` chunk (more chunks follow)
    pub fn response_chunk(body: impl Into<Bytes>) -> Self {
        OutboundMessage::HttpResponseBody {
            body: body.into(),
            more_body: true,
        }
    }

    /// `websocket.accept` without subprotocol or extra headers
    pub fn accept() -> Self {
        OutboundMessage::WebSocketAccept {
            subprotocol: None,
            headers: Vec::new(),
        }
    }

    /// `websocket.send` carrying a text frame
    pub fn send_text(text: impl Into<String>) -> Self {
        OutboundMessage::WebSocketSend(Frame::Text(text.into()))
    }

    /// `websocket.send` carrying a binary frame
    pub fn send_bytes(bytes: impl Into<Bytes>) -> Self {
        OutboundMessage::WebSocketSend(Frame::Binary(bytes.into()))
    }

    /// `websocket.close` with the given code
    pub fn close(code: u16) -> Self {
        OutboundMessage::WebSocketClose { code, reason: None }
    }
}
