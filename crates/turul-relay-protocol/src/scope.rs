//! Connection scopes
//!
//! A scope is the metadata an application receives when it is called. It is
//! built once by the host, never mutated afterwards, and moved into the
//! application call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered header list; names are lower-cased, duplicates are preserved
pub type Headers = Vec<(String, String)>;

/// Version of the HTTP and WebSocket scope layouts
pub const SCOPE_SPEC_VERSION: &str = "2.3";

/// Scope passed to [`Application::call`](crate::Application::call)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Scope {
    /// Startup/shutdown handshakes
    Lifespan(LifespanScope),
    /// One HTTP request/response exchange
    Http(HttpScope),
    /// One WebSocket connection
    #[serde(rename = "websocket")]
    WebSocket(WebSocketScope),
}

impl Scope {
    /// Protocol name of this scope (`lifespan`, `http`, `websocket`)
    pub fn kind(&self) -> &'static str {
        match self {
            Scope::Lifespan(_) => "lifespan",
            Scope::Http(_) => "http",
            Scope::WebSocket(_) => "websocket",
        }
    }
}

/// Scope of the lifespan protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifespanScope {
    pub version: String,
}

impl Default for LifespanScope {
    fn default() -> Self {
        Self {
            version: crate::PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Scope of a single HTTP request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpScope {
    pub spec_version: String,
    pub http_version: String,
    pub method: String,
    pub scheme: String,
    /// Percent-decoded path, with any configured base path removed
    pub path: String,
    /// Path as received, before base path stripping
    pub raw_path: Option<String>,
    /// Raw (percent-encoded) query string without the leading `?`
    pub query_string: String,
    pub root_path: String,
    pub headers: Headers,
    /// Remote address (host, port)
    pub client: Option<(String, u16)>,
    /// Local address (host, port)
    pub server: Option<(String, u16)>,
    /// Raw trigger event the scope was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Value>,
}

impl Default for HttpScope {
    fn default() -> Self {
        Self {
            spec_version: SCOPE_SPEC_VERSION.to_string(),
            http_version: "1.1".to_string(),
            method: "GET".to_string(),
            scheme: "https".to_string(),
            path: "/".to_string(),
            raw_path: None,
            query_string: String::new(),
            root_path: String::new(),
            headers: Vec::new(),
            client: None,
            server: None,
            trigger: None,
        }
    }
}

/// Scope of a WebSocket connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketScope {
    pub spec_version: String,
    pub http_version: String,
    pub scheme: String,
    pub path: String,
    pub raw_path: Option<String>,
    pub query_string: String,
    pub root_path: String,
    pub headers: Headers,
    pub client: Option<(String, u16)>,
    pub server: Option<(String, u16)>,
    #[serde(default)]
    pub subprotocols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Value>,
}

impl Default for WebSocketScope {
    fn default() -> Self {
        Self {
            spec_version: SCOPE_SPEC_VERSION.to_string(),
            http_version: "1.1".to_string(),
            scheme: "wss".to_string(),
            path: "/".to_string(),
            raw_path: None,
            query_string: String::new(),
            root_path: String::new(),
            headers: Vec::new(),
            client: None,
            server: None,
            subprotocols: Vec::new(),
            trigger: None,
        }
    }
}

/// Case-insensitive lookup of the first value for `name`
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Lower-case every header name, keeping order and duplicates
pub fn normalize_headers<I, K, V>(headers: I) -> Headers
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    headers
        .into_iter()
        .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_serializes_with_type_tag() {
        let scope = Scope::WebSocket(WebSocketScope {
            path: "/chat".to_string(),
            ..WebSocketScope::default()
        });

        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["type"], "websocket");
        assert_eq!(json["path"], "/chat");

        let back: Scope = serde_json::from_value(json).unwrap();
        assert_eq!(back, scope);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let headers = normalize_headers([("Content-Type", "application/json"), ("X-Trace", "1")]);
        assert_eq!(headers[0].0, "content-type");
        assert_eq!(header_value(&headers, "CONTENT-TYPE"), Some("application/json"));
        assert_eq!(header_value(&headers, "missing"), None);
    }
}
