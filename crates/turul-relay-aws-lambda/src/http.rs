//! HTTP cycle
//!
//! One request, one response: the application receives a single
//! `http.request` event and must answer with exactly one
//! `http.response.start` followed by `http.response.body` chunks until
//! `more_body` is false.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, error, warn};

use turul_relay_protocol::{
    Headers, InboundEvent, OutboundMessage, RunningApplication, Scope, SharedApplication,
    header_value, launch,
};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::request::HttpRequest;
use crate::response::CycleResult;

const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const BINARY_CONTENT_ENCODINGS: &[&str] = &["gzip", "deflate", "br"];

/// Whether a response with these headers is returned as text (otherwise base64)
pub fn is_text_response(headers: &Headers, config: &RelayConfig) -> bool {
    let content_type = header_value(headers, "content-type").unwrap_or(DEFAULT_CONTENT_TYPE);

    let binary_encoding = header_value(headers, "content-encoding").is_some_and(|encoding| {
        encoding
            .split(',')
            .map(|e| e.trim().to_ascii_lowercase())
            .any(|e| BINARY_CONTENT_ENCODINGS.contains(&e.as_str()))
    });

    config.is_text_mime_type(content_type) && !binary_encoding
}

/// Response being assembled
enum ResponseState {
    AwaitingStart,
    Streaming {
        status: u16,
        headers: Headers,
        body: BytesMut,
        text: bool,
    },
}

/// Drives one HTTP request/response exchange
pub struct HttpCycle<'a> {
    app: SharedApplication,
    config: &'a RelayConfig,
}

impl<'a> HttpCycle<'a> {
    pub fn new(app: SharedApplication, config: &'a RelayConfig) -> Self {
        Self { app, config }
    }

    pub async fn run(&self, request: HttpRequest) -> Result<CycleResult> {
        let scope = request.to_scope();
        debug!("HTTP cycle: {} {}", scope.method, scope.path);

        let mut running = launch(self.app.clone(), Scope::Http(scope));
        if running
            .deliver(InboundEvent::HttpRequest {
                body: request.body,
                more_body: false,
            })
            .is_err()
        {
            return self.application_ended(&mut running, None).await;
        }

        let mut state = ResponseState::AwaitingStart;
        let result = loop {
            let message = self.next_message(&mut running).await?;

            let Some(message) = message else {
                let started = matches!(state, ResponseState::Streaming { .. });
                return self.application_ended(&mut running, Some(started)).await;
            };

            match (state, message) {
                (ResponseState::AwaitingStart, OutboundMessage::HttpResponseStart { status, headers }) => {
                    let text = is_text_response(&headers, self.config);
                    debug!("Response started: {} (text: {})", status, text);
                    state = ResponseState::Streaming {
                        status,
                        headers,
                        body: BytesMut::new(),
                        text,
                    };
                }
                (
                    ResponseState::Streaming {
                        status,
                        headers,
                        mut body,
                        text,
                    },
                    OutboundMessage::HttpResponseBody {
                        body: chunk,
                        more_body,
                    },
                ) => {
                    body.extend_from_slice(&chunk);
                    if !more_body {
                        break finish(status, headers, body.freeze(), text);
                    }
                    state = ResponseState::Streaming {
                        status,
                        headers,
                        body,
                        text,
                    };
                }
                (ResponseState::AwaitingStart, OutboundMessage::HttpResponseBody { .. }) => {
                    return Err(RelayError::violation(
                        "http.response.body sent before http.response.start",
                    ));
                }
                (ResponseState::Streaming { .. }, OutboundMessage::HttpResponseStart { .. }) => {
                    return Err(RelayError::violation("http.response.start sent twice"));
                }
                (_, other) => {
                    return Err(RelayError::violation(format!(
                        "unexpected {} on an http scope",
                        other.kind()
                    )));
                }
            }
        };

        self.complete(running).await?;
        Ok(result)
    }

    async fn next_message(&self, running: &mut RunningApplication) -> Result<Option<OutboundMessage>> {
        tokio::time::timeout(self.config.exchange_timeout, running.host().recv())
            .await
            .map_err(|_| {
                RelayError::Timeout(format!(
                    "http response after {:?}",
                    self.config.exchange_timeout
                ))
            })
    }

    /// The application returned (or dropped its channel) before the response completed.
    ///
    /// `started` is `None` when the request could not even be delivered.
    async fn application_ended(
        &self,
        running: &mut RunningApplication,
        started: Option<bool>,
    ) -> Result<CycleResult> {
        let outcome = running.join(self.config.exchange_timeout).await;

        match (outcome, started.unwrap_or(false)) {
            (Err(err), false) => {
                error!("Application failed before starting a response: {}", err);
                Ok(CycleResult::internal_server_error())
            }
            (Err(err), true) => Err(RelayError::Application(err)),
            (Ok(()), false) => Err(RelayError::violation(
                "application returned without sending http.response.start",
            )),
            (Ok(()), true) => Err(RelayError::violation(
                "application returned before completing the response body",
            )),
        }
    }

    /// Deliver `http.disconnect` and wait for the application to finish
    async fn complete(&self, mut running: RunningApplication) -> Result<()> {
        let _ = running.deliver(InboundEvent::HttpDisconnect);
        running.host().close_inbound();

        loop {
            match tokio::time::timeout(self.config.exchange_timeout, running.host().recv()).await {
                Ok(Some(message)) => {
                    return Err(RelayError::violation(format!(
                        "{} sent after the response completed",
                        message.kind()
                    )));
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Application still running {:?} after the response completed, aborting",
                        self.config.exchange_timeout
                    );
                    running.abort();
                    return Ok(());
                }
            }
        }

        running
            .join(self.config.exchange_timeout)
            .await
            .map_err(RelayError::Application)
    }
}

fn finish(status: u16, headers: Headers, body: Bytes, text: bool) -> CycleResult {
    let is_base64_encoded = if body.is_empty() {
        false
    } else if text {
        // Invalid UTF-8 under a text content type still has to survive the trip
        std::str::from_utf8(&body).is_err()
    } else {
        true
    };

    CycleResult {
        status_code: status,
        headers,
        body,
        is_base64_encoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_is_text_response() {
        let config = RelayConfig::default();

        assert!(is_text_response(&headers(&[]), &config));
        assert!(is_text_response(
            &headers(&[("content-type", "application/json")]),
            &config
        ));
        assert!(!is_text_response(
            &headers(&[("content-type", "image/png")]),
            &config
        ));
        assert!(!is_text_response(
            &headers(&[("content-type", "text/html"), ("content-encoding", "gzip")]),
            &config
        ));
        assert!(is_text_response(
            &headers(&[("content-type", "text/html"), ("content-encoding", "identity")]),
            &config
        ));
    }

    #[test]
    fn test_finish_encoding_rules() {
        let empty = finish(204, Vec::new(), Bytes::new(), false);
        assert!(!empty.is_base64_encoded);

        let text = finish(200, Vec::new(), Bytes::from_static(b"ok"), true);
        assert!(!text.is_base64_encoded);

        let binary = finish(200, Vec::new(), Bytes::from_static(b"ok"), false);
        assert!(binary.is_base64_encoded);

        let invalid_utf8 = finish(200, Vec::new(), Bytes::from_static(&[0xff, 0xfe]), true);
        assert!(invalid_utf8.is_base64_encoded);
    }
}
