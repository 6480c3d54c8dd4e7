//! Trigger event classification
//!
//! Lambda hands the relay raw JSON. The source format is detected from the
//! shape of the payload, then parsed into a [`CanonicalRequest`]:
//!
//! - WebSocket: `requestContext.eventType` and `requestContext.connectionId`
//! - HTTP API (payload v2): `version: "2.0"` and `requestContext.http`
//! - Application Load Balancer: `requestContext.elb`
//! - REST API (payload v1): `httpMethod` and `requestContext`

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::debug;

use turul_relay_protocol::{Headers, header_value};

use crate::error::{RelayError, Result};
use crate::request::{CanonicalRequest, HttpRequest, MessageType, WsRequest};

/// Where a trigger event came from; decides the reply format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// API Gateway REST API (payload format 1.0)
    ApiGatewayRest,
    /// API Gateway HTTP API (payload format 2.0)
    ApiGatewayHttp,
    /// Application Load Balancer; `multi_value_headers` mirrors the target group setting
    Alb { multi_value_headers: bool },
    /// API Gateway WebSocket API
    WebSocket,
}

/// Classify a raw trigger event and parse it into the canonical request
pub fn classify(event: &Value, base_path: &str) -> Result<(TriggerSource, CanonicalRequest)> {
    let context = event.get("requestContext");

    if let Some(ctx) = context
        && let Some(event_type) = str_field(ctx, "eventType")
        && ctx.get("connectionId").is_some()
    {
        let request = parse_websocket(event, ctx, event_type)?;
        return Ok((TriggerSource::WebSocket, CanonicalRequest::WebSocket(request)));
    }

    if str_field(event, "version") == Some("2.0")
        && let Some(ctx) = context
        && let Some(http) = ctx.get("http")
    {
        let request = parse_http_api(event, http, base_path)?;
        return Ok((TriggerSource::ApiGatewayHttp, CanonicalRequest::Http(request)));
    }

    if context.and_then(|ctx| ctx.get("elb")).is_some() {
        let multi_value_headers = event.get("multiValueHeaders").is_some();
        let request = parse_alb(event, base_path)?;
        return Ok((
            TriggerSource::Alb {
                multi_value_headers,
            },
            CanonicalRequest::Http(request),
        ));
    }

    if event.get("httpMethod").is_some()
        && let Some(ctx) = context
    {
        let request = parse_rest_api(event, ctx, base_path)?;
        return Ok((TriggerSource::ApiGatewayRest, CanonicalRequest::Http(request)));
    }

    Err(RelayError::Configuration(
        "Unable to determine trigger source: expected an API Gateway (REST, HTTP or WebSocket) or ALB event"
            .to_string(),
    ))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Headers from `multiValueHeaders` when present, otherwise `headers`
fn collect_headers(event: &Value) -> Headers {
    let mut headers = Headers::new();

    if let Some(multi) = event.get("multiValueHeaders").and_then(Value::as_object)
        && !multi.is_empty()
    {
        for (name, values) in multi {
            let name = name.to_ascii_lowercase();
            for value in values.as_array().into_iter().flatten() {
                if let Some(value) = value.as_str() {
                    headers.push((name.clone(), value.to_string()));
                }
            }
        }
        return headers;
    }

    if let Some(single) = event.get("headers").and_then(Value::as_object) {
        for (name, value) in single {
            if let Some(value) = value.as_str() {
                headers.push((name.to_ascii_lowercase(), value.to_string()));
            }
        }
    }
    headers
}

/// Decode `body`, honouring `isBase64Encoded`. Returns the bytes and whether they were base64.
fn decode_body(event: &Value) -> Result<(Bytes, bool)> {
    let is_base64 = event
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let Some(body) = str_field(event, "body") else {
        return Ok((Bytes::new(), is_base64));
    };

    if is_base64 {
        let decoded = STANDARD
            .decode(body)
            .map_err(|e| RelayError::Configuration(format!("Invalid base64 request body: {}", e)))?;
        Ok((Bytes::from(decoded), true))
    } else {
        Ok((Bytes::copy_from_slice(body.as_bytes()), false))
    }
}

/// Rebuild a query string from decoded (multi-value) parameter maps, re-encoding it
fn encoded_query(event: &Value) -> String {
    let mut pairs = Vec::new();

    if let Some(multi) = event
        .get("multiValueQueryStringParameters")
        .and_then(Value::as_object)
    {
        for (key, values) in multi {
            for value in values.as_array().into_iter().flatten() {
                if let Some(value) = value.as_str() {
                    pairs.push(encode_pair(key, value));
                }
            }
        }
    } else if let Some(single) = event
        .get("queryStringParameters")
        .and_then(Value::as_object)
    {
        for (key, value) in single {
            if let Some(value) = value.as_str() {
                pairs.push(encode_pair(key, value));
            }
        }
    }

    pairs.join("&")
}

fn encode_pair(key: &str, value: &str) -> String {
    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
}

/// ALB passes query parameters through still encoded
fn raw_query(event: &Value) -> String {
    let params: Option<&Map<String, Value>> = event
        .get("multiValueQueryStringParameters")
        .or_else(|| event.get("queryStringParameters"))
        .and_then(Value::as_object);

    let mut pairs = Vec::new();
    for (key, value) in params.into_iter().flatten() {
        match value {
            Value::Array(values) => pairs.extend(
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|v| format!("{}={}", key, v)),
            ),
            Value::String(v) => pairs.push(format!("{}={}", key, v)),
            _ => {}
        }
    }
    pairs.join("&")
}

/// Remove `base_path` from the front of `path`, on a segment boundary
fn strip_base_path(path: &str, base_path: &str) -> String {
    let base = base_path.trim().trim_end_matches('/');
    if base.is_empty() {
        return path.to_string();
    }

    let base = if base.starts_with('/') {
        base.to_string()
    } else {
        format!("/{}", base)
    };

    match path.strip_prefix(base.as_str()) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

fn scheme_and_server(headers: &Headers) -> (String, Option<(String, u16)>) {
    let scheme = header_value(headers, "x-forwarded-proto")
        .unwrap_or("https")
        .to_string();
    let default_port = if scheme == "http" { 80 } else { 443 };

    let server = header_value(headers, "host").map(|host| match host.rsplit_once(':') {
        Some((name, port)) if port.parse::<u16>().is_ok() => {
            (name.to_string(), port.parse().unwrap_or(default_port))
        }
        _ => {
            let port = header_value(headers, "x-forwarded-port")
                .and_then(|p| p.parse().ok())
                .unwrap_or(default_port);
            (host.to_string(), port)
        }
    });

    (scheme, server)
}

fn http_request(
    event: &Value,
    method: &str,
    raw_path: &str,
    headers: Headers,
    query_string: String,
    source_ip: Option<String>,
    base_path: &str,
) -> Result<HttpRequest> {
    let (body, _) = decode_body(event)?;
    let (scheme, server) = scheme_and_server(&headers);
    let raw_path = if raw_path.is_empty() { "/" } else { raw_path };

    Ok(HttpRequest {
        method: method.to_ascii_uppercase(),
        path: strip_base_path(raw_path, base_path),
        raw_path: Some(raw_path.to_string()),
        headers,
        query_string,
        body,
        source_ip,
        scheme,
        server,
        root_path: String::new(),
        trigger: event.clone(),
    })
}

fn parse_rest_api(event: &Value, ctx: &Value, base_path: &str) -> Result<HttpRequest> {
    let method = str_field(event, "httpMethod").unwrap_or("GET");
    let path = str_field(event, "path").unwrap_or("/");
    let source_ip = ctx
        .get("identity")
        .and_then(|identity| str_field(identity, "sourceIp"))
        .map(String::from);

    debug!("REST API event: {} {}", method, path);
    http_request(
        event,
        method,
        path,
        collect_headers(event),
        encoded_query(event),
        source_ip,
        base_path,
    )
}

fn parse_http_api(event: &Value, http: &Value, base_path: &str) -> Result<HttpRequest> {
    let method = str_field(http, "method").unwrap_or("GET");
    let raw_path = str_field(event, "rawPath")
        .or_else(|| str_field(http, "path"))
        .unwrap_or("/");
    let source_ip = str_field(http, "sourceIp").map(String::from);

    let mut headers = collect_headers(event);
    if let Some(cookies) = event.get("cookies").and_then(Value::as_array) {
        let joined: Vec<&str> = cookies.iter().filter_map(Value::as_str).collect();
        if !joined.is_empty() {
            headers.push(("cookie".to_string(), joined.join("; ")));
        }
    }

    debug!("HTTP API event: {} {}", method, raw_path);
    let mut request = http_request(
        event,
        method,
        raw_path,
        headers,
        str_field(event, "rawQueryString").unwrap_or("").to_string(),
        source_ip,
        base_path,
    )?;

    // rawPath arrives percent-encoded
    if let Ok(decoded) = urlencoding::decode(&request.path) {
        request.path = decoded.into_owned();
    }
    Ok(request)
}

fn parse_alb(event: &Value, base_path: &str) -> Result<HttpRequest> {
    let method = str_field(event, "httpMethod").unwrap_or("GET");
    let path = str_field(event, "path").unwrap_or("/");
    let headers = collect_headers(event);
    let source_ip = header_value(&headers, "x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(|ip| ip.trim().to_string());

    debug!("ALB event: {} {}", method, path);
    http_request(
        event,
        method,
        path,
        headers,
        raw_query(event),
        source_ip,
        base_path,
    )
}

fn parse_websocket(event: &Value, ctx: &Value, event_type: &str) -> Result<WsRequest> {
    let message_type = MessageType::from_event_type(event_type).ok_or_else(|| {
        RelayError::Configuration(format!("Unsupported WebSocket event type: {}", event_type))
    })?;

    let connection_id = str_field(ctx, "connectionId").unwrap_or_default();
    if connection_id.is_empty() {
        return Err(RelayError::Configuration(
            "WebSocket event has an empty connectionId".to_string(),
        ));
    }

    let endpoint_url = match (str_field(ctx, "domainName"), str_field(ctx, "stage")) {
        (Some(domain), Some(stage)) => Some(format!("https://{}/{}", domain, stage)),
        _ => None,
    };
    let source_ip = ctx
        .get("identity")
        .and_then(|identity| str_field(identity, "sourceIp"))
        .map(String::from);

    let (raw_body, is_binary) = decode_body(event)?;

    debug!("WebSocket {} event for connection {}", message_type, connection_id);
    Ok(WsRequest {
        connection_id: connection_id.to_string(),
        message_type,
        raw_body,
        is_binary,
        headers: collect_headers(event),
        path: "/".to_string(),
        query_string: encoded_query(event),
        source_ip,
        endpoint_url,
        trigger: event.clone(),
    })
}
