//! HTTP triggers end to end: event in, vendor reply out

mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use common::*;
use turul_relay_aws_lambda::RelayError;
use turul_relay_protocol::prelude::*;

#[tokio::test]
async fn test_json_response_over_rest_api() {
    let relay = relay_builder(json_app()).build().unwrap();

    let reply = relay
        .handle(rest_event("GET", "/items", None), context())
        .await
        .unwrap();

    assert_eq!(reply["statusCode"], 200);
    assert_eq!(reply["body"], r#"{"ok":true}"#);
    assert_eq!(reply["isBase64Encoded"], false);
    assert_eq!(reply["headers"]["content-type"], "application/json");
}

#[tokio::test]
async fn test_binary_response_is_base64_encoded() {
    const PNG: &[u8] = &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

    let app = application_fn(|_scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
        let _ = inbound.receive().await;
        outbound
            .send(OutboundMessage::response_start(
                200,
                vec![("content-type".into(), "image/png".into())],
            ))
            .await?;
        outbound.send(OutboundMessage::response_body(PNG)).await?;
        Ok::<(), ApplicationError>(())
    });
    let relay = relay_builder(app).build().unwrap();

    let reply = relay
        .handle(rest_event("GET", "/logo.png", None), context())
        .await
        .unwrap();

    assert_eq!(reply["isBase64Encoded"], true);
    assert_eq!(reply["body"], STANDARD.encode(PNG));
}

#[tokio::test]
async fn test_body_chunks_are_concatenated_in_order() {
    let app = application_fn(|_scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
        let _ = inbound.receive().await;
        outbound
            .send(OutboundMessage::response_start(200, Vec::new()))
            .await?;
        for chunk in ["one ", "two ", "three"] {
            outbound.send(OutboundMessage::response_chunk(chunk)).await?;
        }
        outbound.send(OutboundMessage::response_body("")).await?;
        Ok::<(), ApplicationError>(())
    });
    let relay = relay_builder(app).build().unwrap();

    let reply = relay
        .handle(rest_event("GET", "/", None), context())
        .await
        .unwrap();

    assert_eq!(reply["body"], "one two three");
    assert_eq!(reply["isBase64Encoded"], false);
}

#[tokio::test]
async fn test_request_is_delivered_to_application() {
    let log = EventLog::default();
    let seen = log.clone();
    let app = application_fn(move |scope: Scope, mut inbound: Inbound, outbound: Outbound| {
        let seen = seen.clone();
        async move {
            if let Scope::Http(http) = &scope {
                seen.push(format!("{} {} ?{}", http.method, http.path, http.query_string));
            }
            if let Some(InboundEvent::HttpRequest { body, more_body }) = inbound.receive().await {
                seen.push(format!("body={} more={}", String::from_utf8_lossy(&body), more_body));
            }
            outbound
                .send(OutboundMessage::response_start(204, Vec::new()))
                .await?;
            outbound.send(OutboundMessage::response_body("")).await?;
            if let Some(event) = inbound.receive().await {
                seen.push(event.kind());
            }
            Ok::<(), ApplicationError>(())
        }
    });
    let relay = relay_builder(app).build().unwrap();

    let reply = relay
        .handle(http_api_event("POST", "/echo%20this", "a=1&b=2"), context())
        .await
        .unwrap();

    assert_eq!(reply["statusCode"], 204);
    assert_eq!(reply["body"], "");
    assert_eq!(
        log.entries(),
        vec![
            "POST /echo this ?a=1&b=2".to_string(),
            "body=hello more=false".to_string(),
            "http.disconnect".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_http_api_reply_moves_set_cookie_to_cookies() {
    let app = application_fn(|_scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
        let _ = inbound.receive().await;
        outbound
            .send(OutboundMessage::response_start(
                200,
                vec![
                    ("content-type".into(), "text/plain".into()),
                    ("set-cookie".into(), "a=1".into()),
                    ("set-cookie".into(), "b=2".into()),
                    ("vary".into(), "accept".into()),
                    ("vary".into(), "origin".into()),
                ],
            ))
            .await?;
        outbound.send(OutboundMessage::response_body("ok")).await?;
        Ok::<(), ApplicationError>(())
    });
    let relay = relay_builder(app).build().unwrap();

    let reply = relay
        .handle(http_api_event("GET", "/", ""), context())
        .await
        .unwrap();

    assert_eq!(reply["cookies"], json!(["a=1", "b=2"]));
    assert_eq!(reply["headers"]["vary"], "accept,origin");
    assert!(reply["headers"].get("set-cookie").is_none());
}

#[tokio::test]
async fn test_alb_reply_has_status_description() {
    let relay = relay_builder(json_app()).build().unwrap();

    let reply = relay
        .handle(alb_event("GET", "/health"), context())
        .await
        .unwrap();

    assert_eq!(reply["statusCode"], 200);
    assert_eq!(reply["statusDescription"], "200 OK");
    assert_eq!(reply["headers"]["content-type"], "application/json");
}

#[tokio::test]
async fn test_base_path_is_stripped() {
    let log = EventLog::default();
    let seen = log.clone();
    let app = application_fn(move |scope: Scope, mut inbound: Inbound, outbound: Outbound| {
        let seen = seen.clone();
        async move {
            if let Scope::Http(http) = &scope {
                seen.push(http.path.clone());
            }
            let _ = inbound.receive().await;
            outbound
                .send(OutboundMessage::response_start(200, Vec::new()))
                .await?;
            outbound.send(OutboundMessage::response_body("")).await?;
            Ok::<(), ApplicationError>(())
        }
    });
    let relay = relay_builder(app)
        .api_gateway_base_path("/prod")
        .build()
        .unwrap();

    relay
        .handle(rest_event("GET", "/prod/users/7", None), context())
        .await
        .unwrap();

    assert_eq!(log.entries(), vec!["/users/7".to_string()]);
}

#[tokio::test]
async fn test_application_error_before_start_is_500() {
    let app = application_fn(|_scope: Scope, mut inbound: Inbound, _outbound: Outbound| async move {
        let _ = inbound.receive().await;
        Err::<(), _>(ApplicationError::msg("database exploded"))
    });
    let relay = relay_builder(app).build().unwrap();

    let reply = relay
        .handle(rest_event("GET", "/", None), context())
        .await
        .unwrap();

    assert_eq!(reply["statusCode"], 500);
    assert_eq!(reply["body"], "Internal Server Error");
    assert_eq!(reply["headers"]["content-type"], "text/plain; charset=utf-8");
}

#[tokio::test]
async fn test_application_error_after_start_propagates() {
    let app = application_fn(|_scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
        let _ = inbound.receive().await;
        outbound
            .send(OutboundMessage::response_start(200, Vec::new()))
            .await?;
        Err::<(), _>(ApplicationError::msg("half way"))
    });
    let relay = relay_builder(app).build().unwrap();

    let err = relay
        .handle(rest_event("GET", "/", None), context())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Application(_)));
}

#[tokio::test]
async fn test_body_before_start_is_protocol_violation() {
    let app = application_fn(|_scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
        let _ = inbound.receive().await;
        outbound.send(OutboundMessage::response_body("oops")).await?;
        Ok::<(), ApplicationError>(())
    });
    let relay = relay_builder(app).build().unwrap();

    let err = relay
        .handle(rest_event("GET", "/", None), context())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::ProtocolViolation(ref m) if m.contains("before http.response.start")));
}

#[tokio::test]
async fn test_second_start_is_protocol_violation() {
    let app = application_fn(|_scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
        let _ = inbound.receive().await;
        outbound
            .send(OutboundMessage::response_start(200, Vec::new()))
            .await?;
        outbound
            .send(OutboundMessage::response_start(201, Vec::new()))
            .await?;
        Ok::<(), ApplicationError>(())
    });
    let relay = relay_builder(app).build().unwrap();

    let err = relay
        .handle(rest_event("GET", "/", None), context())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::ProtocolViolation(_)));
}

#[tokio::test]
async fn test_message_after_completion_is_protocol_violation() {
    let app = application_fn(|_scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
        let _ = inbound.receive().await;
        outbound
            .send(OutboundMessage::response_start(200, Vec::new()))
            .await?;
        outbound.send(OutboundMessage::response_body("done")).await?;
        outbound.send(OutboundMessage::response_body("extra")).await?;
        Ok::<(), ApplicationError>(())
    });
    let relay = relay_builder(app).build().unwrap();

    let err = relay
        .handle(rest_event("GET", "/", None), context())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::ProtocolViolation(ref m) if m.contains("after the response completed")));
}

#[tokio::test]
async fn test_unrecognized_event_is_configuration_error() {
    let relay = relay_builder(json_app()).build().unwrap();

    let err = relay
        .handle(json!({"Records": [{"eventSource": "aws:sqs"}]}), context())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Configuration(_)));
}
