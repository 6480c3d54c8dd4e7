//! WebSocket cycle
//!
//! A WebSocket API delivers each connection as a series of unrelated
//! invocations. Every invocation replays the connect handshake against a fresh
//! application call, using the scope stored when the connection was accepted:
//!
//! | Event | Application sees | Relay then |
//! |-------|------------------|------------|
//! | `CONNECT` | `websocket.connect` | accept: hook, store record, 200; close: 403 |
//! | `MESSAGE` | `websocket.connect`, `websocket.receive` | refresh record, push every `websocket.send`, 200 |
//! | `DISCONNECT` | `websocket.connect`, `websocket.disconnect` | hook, delete record, 200 |
//!
//! The application may only send frames after it has been given the received
//! message. Concurrent events for the same connection are not serialized.

use std::time::Duration;

use tracing::{debug, info, warn};

use turul_relay_connection_storage::ConnectionRecord;
use turul_relay_protocol::{
    HostStep, InboundEvent, OutboundMessage, RunningApplication, Scope, SharedApplication,
    WebSocketScope, launch,
};

use crate::backend::WebSocketBackend;
use crate::error::{RelayError, Result};
use crate::request::{MessageType, WsRequest};
use crate::response::CycleResult;

/// Close code delivered with `websocket.disconnect`
pub const NORMAL_CLOSURE: u16 = 1000;

/// How the application answered `websocket.connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Accepted,
    /// Closed before accepting, or returned without accepting
    Rejected,
    /// Accepted, then closed or returned before anything else was delivered
    AcceptedThenClosed,
}

/// Drives one WebSocket event through the application
pub struct WebSocketCycle<'a> {
    app: SharedApplication,
    backend: &'a WebSocketBackend,
    timeout: Duration,
}

impl<'a> WebSocketCycle<'a> {
    pub fn new(app: SharedApplication, backend: &'a WebSocketBackend, timeout: Duration) -> Self {
        Self {
            app,
            backend,
            timeout,
        }
    }

    pub async fn run(&self, request: WsRequest) -> Result<CycleResult> {
        debug!(
            "WebSocket cycle: {} for connection {}",
            request.message_type, request.connection_id
        );

        match request.message_type {
            MessageType::Connect => self.connect(request).await,
            MessageType::Message => self.message(request).await,
            MessageType::Disconnect => self.disconnect(request).await,
        }
    }

    async fn connect(&self, request: WsRequest) -> Result<CycleResult> {
        let scope = request.to_scope();
        let (mut running, handshake) = self.handshake(scope.clone()).await?;

        if handshake == Handshake::Rejected {
            info!("Connection {} rejected by application", request.connection_id);
            self.release(running).await?;
            return Ok(CycleResult::status(403));
        }

        self.backend.on_connect(&request.connection_id)?;
        self.backend
            .put(ConnectionRecord::new(
                request.connection_id.clone(),
                scope,
                request.endpoint_url.clone(),
            ))
            .await?;
        info!("Connection {} accepted", request.connection_id);

        running.host().close_inbound();
        self.release(running).await?;
        Ok(CycleResult::status(200))
    }

    async fn message(&self, request: WsRequest) -> Result<CycleResult> {
        let mut record = self
            .backend
            .get(&request.connection_id)
            .await?
            .ok_or_else(|| RelayError::UnknownConnection(request.connection_id.clone()))?;

        let (mut running, handshake) = self.handshake(record.scope.clone()).await?;
        match handshake {
            Handshake::Rejected => {
                warn!(
                    "Application rejected replayed handshake for {}",
                    request.connection_id
                );
                self.release(running).await?;
                return Ok(CycleResult::status(403));
            }
            Handshake::AcceptedThenClosed => {
                debug!(
                    "Application closed {} during the replayed handshake; message not delivered",
                    request.connection_id
                );
                self.release(running).await?;
                return Ok(CycleResult::status(200));
            }
            Handshake::Accepted => {}
        }

        record.touch();
        self.backend.put(record).await?;

        running
            .deliver(InboundEvent::WebSocketReceive(request.frame()))
            .map_err(|_| RelayError::violation("application stopped receiving"))?;

        let mut pushed = 0usize;
        loop {
            match self.step(&mut running, "websocket.send").await? {
                HostStep::Message(OutboundMessage::WebSocketSend(frame)) => {
                    self.backend
                        .push(&request.connection_id, frame)
                        .await
                        .map_err(|source| RelayError::BackendPush {
                            connection_id: request.connection_id.clone(),
                            source,
                        })?;
                    pushed += 1;
                }
                HostStep::Message(OutboundMessage::WebSocketClose { code, .. }) => {
                    debug!("Application closed {} with code {}", request.connection_id, code);
                    break;
                }
                HostStep::Message(other) => {
                    return Err(RelayError::violation(format!(
                        "unexpected {} after websocket.receive",
                        other.kind()
                    )));
                }
                HostStep::Idle | HostStep::Closed => break,
            }
        }

        debug!("Pushed {} frames to {}", pushed, request.connection_id);
        running.host().close_inbound();
        self.release(running).await?;
        Ok(CycleResult::status(200))
    }

    async fn disconnect(&self, request: WsRequest) -> Result<CycleResult> {
        match self.backend.get(&request.connection_id).await? {
            Some(record) => {
                let (mut running, handshake) = self.handshake(record.scope).await?;

                if handshake == Handshake::Accepted {
                    running
                        .deliver(InboundEvent::WebSocketDisconnect {
                            code: NORMAL_CLOSURE,
                        })
                        .map_err(|_| RelayError::violation("application stopped receiving"))?;

                    loop {
                        match self.step(&mut running, "websocket.disconnect handling").await? {
                            HostStep::Message(OutboundMessage::WebSocketSend(_)) => {
                                return Err(RelayError::violation(
                                    "websocket.send after websocket.disconnect",
                                ));
                            }
                            HostStep::Message(OutboundMessage::WebSocketClose { .. }) => {}
                            HostStep::Message(other) => {
                                return Err(RelayError::violation(format!(
                                    "unexpected {} after websocket.disconnect",
                                    other.kind()
                                )));
                            }
                            HostStep::Idle | HostStep::Closed => break,
                        }
                    }
                }

                running.host().close_inbound();
                self.release(running).await?;
            }
            None => {
                debug!(
                    "No record for disconnecting connection {}",
                    request.connection_id
                );
            }
        }

        self.backend.on_disconnect(&request.connection_id)?;
        let existed = self.backend.delete(&request.connection_id).await?;
        info!(
            "Connection {} disconnected (record existed: {})",
            request.connection_id, existed
        );
        Ok(CycleResult::status(200))
    }

    /// Launch the application, deliver `websocket.connect` and wait for its answer.
    ///
    /// On `Accepted` the application has consumed the connect event and is
    /// waiting for the next one; nothing may be sent in between.
    async fn handshake(&self, scope: WebSocketScope) -> Result<(RunningApplication, Handshake)> {
        let mut running = launch(self.app.clone(), Scope::WebSocket(scope));
        running
            .deliver(InboundEvent::WebSocketConnect)
            .map_err(|_| RelayError::violation("application stopped receiving"))?;

        let mut accepted = false;
        loop {
            match self.step(&mut running, "websocket handshake").await? {
                HostStep::Message(OutboundMessage::WebSocketAccept { subprotocol, .. })
                    if !accepted =>
                {
                    debug!("Handshake accepted (subprotocol: {:?})", subprotocol);
                    accepted = true;
                }
                HostStep::Message(OutboundMessage::WebSocketClose { code, .. }) => {
                    debug!("Handshake closed with code {}", code);
                    let handshake = if accepted {
                        Handshake::AcceptedThenClosed
                    } else {
                        Handshake::Rejected
                    };
                    return Ok((running, handshake));
                }
                HostStep::Message(OutboundMessage::WebSocketSend(_)) => {
                    return Err(RelayError::violation(
                        "websocket.send before a message was received",
                    ));
                }
                HostStep::Message(other) => {
                    return Err(RelayError::violation(format!(
                        "unexpected {} during websocket handshake",
                        other.kind()
                    )));
                }
                HostStep::Idle if accepted => return Ok((running, Handshake::Accepted)),
                HostStep::Idle => {
                    warn!("Application awaited further events without accepting the connection");
                    return Ok((running, Handshake::Rejected));
                }
                HostStep::Closed => {
                    running
                        .join(self.timeout)
                        .await
                        .map_err(RelayError::Application)?;
                    let handshake = if accepted {
                        Handshake::AcceptedThenClosed
                    } else {
                        Handshake::Rejected
                    };
                    return Ok((running, handshake));
                }
            }
        }
    }

    async fn step(&self, running: &mut RunningApplication, waiting_for: &str) -> Result<HostStep> {
        tokio::time::timeout(self.timeout, running.host().step())
            .await
            .map_err(|_| RelayError::Timeout(format!("{} after {:?}", waiting_for, self.timeout)))
    }

    /// Let the application return and surface its error, if any
    async fn release(&self, running: RunningApplication) -> Result<()> {
        match running.shutdown(self.timeout).await {
            Some(Err(err)) => Err(RelayError::Application(err)),
            Some(Ok(())) => Ok(()),
            None => {
                warn!("WebSocket application aborted after {:?}", self.timeout);
                Ok(())
            }
        }
    }
}
