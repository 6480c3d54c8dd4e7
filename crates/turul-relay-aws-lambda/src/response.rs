//! Cycle results and vendor reply encoding

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::StatusCode;
use serde_json::{Map, Value, json};

use turul_relay_protocol::Headers;

use crate::trigger::TriggerSource;

/// The outcome of one HTTP or WebSocket cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleResult {
    pub status_code: u16,
    pub headers: Headers,
    pub body: Bytes,
    /// `body` must be base64 encoded in the vendor reply
    pub is_base64_encoded: bool,
}

impl CycleResult {
    /// A bodiless result (WebSocket cycles)
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            body: Bytes::new(),
            is_base64_encoded: false,
        }
    }

    /// Returned when the application fails before starting its response
    pub fn internal_server_error() -> Self {
        Self {
            status_code: 500,
            headers: vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: Bytes::from_static(b"Internal Server Error"),
            is_base64_encoded: false,
        }
    }

    /// Body as it goes on the wire: base64 when flagged, otherwise UTF-8 text
    pub fn body_string(&self) -> String {
        if self.is_base64_encoded {
            STANDARD.encode(&self.body)
        } else {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }
}

/// Encode a cycle result as the reply the trigger source expects
pub fn encode_reply(source: TriggerSource, result: &CycleResult) -> Value {
    match source {
        TriggerSource::WebSocket => json!({ "statusCode": result.status_code }),
        TriggerSource::ApiGatewayHttp => http_api_reply(result),
        TriggerSource::ApiGatewayRest => {
            let mut reply = rest_reply(result);
            split_headers(&mut reply, &result.headers);
            Value::Object(reply)
        }
        TriggerSource::Alb {
            multi_value_headers,
        } => {
            let mut reply = rest_reply(result);
            reply.insert(
                "statusDescription".to_string(),
                Value::String(status_description(result.status_code)),
            );
            if multi_value_headers {
                reply.insert(
                    "multiValueHeaders".to_string(),
                    grouped_headers(&result.headers)
                        .into_iter()
                        .map(|(name, values)| (name, json!(values)))
                        .collect::<Map<_, _>>()
                        .into(),
                );
            } else {
                // Without multi-value support ALB keeps one value per name
                reply.insert(
                    "headers".to_string(),
                    grouped_headers(&result.headers)
                        .into_iter()
                        .map(|(name, values)| (name, json!(values.join(", "))))
                        .collect::<Map<_, _>>()
                        .into(),
                );
            }
            Value::Object(reply)
        }
    }
}

fn rest_reply(result: &CycleResult) -> Map<String, Value> {
    let mut reply = Map::new();
    reply.insert("statusCode".to_string(), json!(result.status_code));
    reply.insert("body".to_string(), json!(result.body_string()));
    reply.insert(
        "isBase64Encoded".to_string(),
        json!(result.is_base64_encoded),
    );
    reply
}

/// Single-valued names go to `headers`, repeated names to `multiValueHeaders`
fn split_headers(reply: &mut Map<String, Value>, headers: &Headers) {
    let mut single = Map::new();
    let mut multi = Map::new();

    for (name, values) in grouped_headers(headers) {
        if values.len() == 1 {
            single.insert(name, json!(values[0]));
        } else {
            multi.insert(name, json!(values));
        }
    }

    reply.insert("headers".to_string(), Value::Object(single));
    reply.insert("multiValueHeaders".to_string(), Value::Object(multi));
}

fn http_api_reply(result: &CycleResult) -> Value {
    let mut cookies = Vec::new();
    let mut headers = Map::new();

    for (name, values) in grouped_headers(&result.headers) {
        if name == "set-cookie" {
            cookies.extend(values);
        } else {
            headers.insert(name, json!(values.join(",")));
        }
    }

    let mut reply = Map::new();
    reply.insert("statusCode".to_string(), json!(result.status_code));
    reply.insert("headers".to_string(), Value::Object(headers));
    if !cookies.is_empty() {
        reply.insert("cookies".to_string(), json!(cookies));
    }
    reply.insert("body".to_string(), json!(result.body_string()));
    reply.insert(
        "isBase64Encoded".to_string(),
        json!(result.is_base64_encoded),
    );
    Value::Object(reply)
}

/// Group values by lower-cased header name, keeping value order
fn grouped_headers(headers: &Headers) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        grouped
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.clone());
    }
    grouped
}

fn status_description(status_code: u16) -> String {
    let reason = StatusCode::from_u16(status_code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown");
    format!("{} {}", status_code, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with_headers(headers: &[(&str, &str)]) -> CycleResult {
        CycleResult {
            status_code: 200,
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            body: Bytes::from_static(b"{\"ok\":true}"),
            is_base64_encoded: false,
        }
    }

    #[test]
    fn test_websocket_reply_is_status_only() {
        let reply = encode_reply(TriggerSource::WebSocket, &CycleResult::status(403));
        assert_eq!(reply, json!({"statusCode": 403}));
    }

    #[test]
    fn test_rest_reply_splits_multi_value_headers() {
        let result = result_with_headers(&[
            ("content-type", "application/json"),
            ("set-cookie", "a=1"),
            ("set-cookie", "b=2"),
        ]);

        let reply = encode_reply(TriggerSource::ApiGatewayRest, &result);
        assert_eq!(reply["statusCode"], 200);
        assert_eq!(reply["headers"]["content-type"], "application/json");
        assert_eq!(reply["multiValueHeaders"]["set-cookie"], json!(["a=1", "b=2"]));
        assert_eq!(reply["body"], "{\"ok\":true}");
        assert_eq!(reply["isBase64Encoded"], false);
    }

    #[test]
    fn test_http_api_reply_moves_cookies() {
        let result = result_with_headers(&[
            ("vary", "accept"),
            ("vary", "origin"),
            ("set-cookie", "a=1"),
        ]);

        let reply = encode_reply(TriggerSource::ApiGatewayHttp, &result);
        assert_eq!(reply["headers"]["vary"], "accept,origin");
        assert_eq!(reply["cookies"], json!(["a=1"]));
        assert!(reply["headers"].get("set-cookie").is_none());
    }

    #[test]
    fn test_alb_reply() {
        let result = result_with_headers(&[("x-a", "1"), ("x-a", "2")]);

        let reply = encode_reply(
            TriggerSource::Alb {
                multi_value_headers: true,
            },
            &result,
        );
        assert_eq!(reply["statusDescription"], "200 OK");
        assert_eq!(reply["multiValueHeaders"]["x-a"], json!(["1", "2"]));
        assert!(reply.get("headers").is_none());

        let reply = encode_reply(
            TriggerSource::Alb {
                multi_value_headers: false,
            },
            &result,
        );
        assert_eq!(reply["headers"]["x-a"], "1, 2");
    }

    #[test]
    fn test_base64_body() {
        let result = CycleResult {
            status_code: 200,
            headers: vec![("content-type".into(), "image/png".into())],
            body: Bytes::from_static(&[0x89, 0x50, 0x4e, 0x47]),
            is_base64_encoded: true,
        };

        let reply = encode_reply(TriggerSource::ApiGatewayRest, &result);
        assert_eq!(reply["body"], "iVBORw==");
        assert_eq!(reply["isBase64Encoded"], true);
    }
}
