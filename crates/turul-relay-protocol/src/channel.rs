//! Host/application channel
//!
//! Both directions are FIFO queues, so the order in which the application
//! emits messages is the order in which the host observes them. The host side
//! additionally tracks how many events the application has pulled and whether
//! it is parked on an empty inbound queue, which is how a host running a
//! single exchange knows the application has nothing more to say.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::SharedApplication;
use crate::error::{ApplicationError, ChannelClosed};
use crate::message::{InboundEvent, OutboundMessage};
use crate::scope::Scope;

struct PullState {
    /// Events taken off the inbound queue by the application
    pulled: AtomicUsize,
    /// `Some(n)` once the application blocked on an empty queue after pulling `n` events
    waiting: watch::Sender<Option<usize>>,
}

/// Create a connected host/application channel pair
pub fn channel() -> (HostChannel, Inbound, Outbound) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let (waiting_tx, waiting_rx) = watch::channel(None);

    let state = Arc::new(PullState {
        pulled: AtomicUsize::new(0),
        waiting: waiting_tx,
    });

    let host = HostChannel {
        events: Some(event_tx),
        messages: message_rx,
        state: Arc::clone(&state),
        waiting: waiting_rx,
        sent: 0,
    };

    (
        host,
        Inbound {
            events: event_rx,
            state,
        },
        Outbound {
            messages: message_tx,
        },
    )
}

/// Application side: events delivered by the host
pub struct Inbound {
    events: mpsc::UnboundedReceiver<InboundEvent>,
    state: Arc<PullState>,
}

impl Inbound {
    /// Wait for the next event. `None` means the host closed the connection.
    pub async fn receive(&mut self) -> Option<InboundEvent> {
        let event = match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => {
                let pulled = self.state.pulled.load(Ordering::SeqCst);
                self.state.waiting.send_replace(Some(pulled));
                self.events.recv().await
            }
            Err(TryRecvError::Disconnected) => None,
        };

        if event.is_some() {
            self.state.pulled.fetch_add(1, Ordering::SeqCst);
        }
        event
    }
}

/// Application side: messages sent back to the host
#[derive(Clone)]
pub struct Outbound {
    messages: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbound {
    /// Send a message to the host
    pub async fn send(&self, message: OutboundMessage) -> Result<(), ChannelClosed> {
        self.messages.send(message).map_err(|_| ChannelClosed)
    }
}

/// What the host observed next on the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStep {
    /// The application emitted a message
    Message(OutboundMessage),
    /// The application consumed every delivered event and is waiting for more
    Idle,
    /// The application dropped its outbound queue (it returned)
    Closed,
}

/// Host side of the channel
pub struct HostChannel {
    events: Option<mpsc::UnboundedSender<InboundEvent>>,
    messages: mpsc::UnboundedReceiver<OutboundMessage>,
    state: Arc<PullState>,
    waiting: watch::Receiver<Option<usize>>,
    sent: usize,
}

impl HostChannel {
    /// Queue an event for the application
    pub fn deliver(&mut self, event: InboundEvent) -> Result<(), ChannelClosed> {
        let events = self.events.as_ref().ok_or(ChannelClosed)?;
        events.send(event).map_err(|_| ChannelClosed)?;
        self.sent += 1;
        Ok(())
    }

    /// Stop delivering events; the application's next `receive` on an empty queue returns `None`
    pub fn close_inbound(&mut self) {
        self.events = None;
    }

    /// Number of delivered events the application has taken off the queue
    #[cfg(test)]
    pub(crate) fn pulled(&self) -> usize {
        self.state.pulled.load(Ordering::SeqCst)
    }

    /// True when the application has pulled everything and is blocked on `receive`
    pub fn is_idle(&self) -> bool {
        *self.waiting.borrow() == Some(self.sent)
    }

    /// Next outbound message, ignoring idleness. `None` once the application returned.
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.messages.recv().await
    }

    /// Next message, or notice that the application went idle or returned.
    ///
    /// Messages emitted before the application parked are always returned
    /// before `Idle`.
    pub async fn step(&mut self) -> HostStep {
        loop {
            let idle = self.is_idle();

            match self.messages.try_recv() {
                Ok(message) => return HostStep::Message(message),
                Err(TryRecvError::Disconnected) => return HostStep::Closed,
                Err(TryRecvError::Empty) => {}
            }

            if idle {
                return HostStep::Idle;
            }

            tokio::select! {
                message = self.messages.recv() => {
                    return match message {
                        Some(message) => HostStep::Message(message),
                        None => HostStep::Closed,
                    };
                }
                changed = self.waiting.changed() => {
                    if changed.is_err() {
                        // Pull state outlives both halves; nothing to observe any more
                        return HostStep::Closed;
                    }
                }
            }
        }
    }
}

/// An application call running on the tokio runtime
pub struct RunningApplication {
    host: HostChannel,
    task: Option<JoinHandle<Result<(), ApplicationError>>>,
    kind: &'static str,
}

/// Spawn `app` for `scope` and return the host side of its channel
pub fn launch(app: SharedApplication, scope: Scope) -> RunningApplication {
    let (host, inbound, outbound) = channel();
    let kind = scope.kind();

    debug!("Launching application for {} scope", kind);
    let task = tokio::spawn(async move { app.call(scope, inbound, outbound).await });

    RunningApplication {
        host,
        task: Some(task),
        kind,
    }
}

impl RunningApplication {
    /// Host side of the channel
    pub fn host(&mut self) -> &mut HostChannel {
        &mut self.host
    }

    /// Queue an event for the application
    pub fn deliver(&mut self, event: InboundEvent) -> Result<(), ChannelClosed> {
        debug!("Delivering {} to {} application", event.kind(), self.kind);
        self.host.deliver(event)
    }

    /// Wait up to `timeout` for the application call to return
    pub async fn join(&mut self, timeout: Duration) -> Result<(), ApplicationError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let abort = task.abort_handle();

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ApplicationError::Panicked(join_err.to_string())),
            Err(_) => {
                abort.abort();
                Err(ApplicationError::Panicked(format!(
                    "{} application did not return within {:?}",
                    self.kind, timeout
                )))
            }
        }
    }

    /// Close the inbound queue and give the application `grace` to return.
    ///
    /// Returns `None` when the application had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> Option<Result<(), ApplicationError>> {
        self.host.close_inbound();
        let Some(task) = self.task.take() else {
            // Already joined
            return Some(Ok(()));
        };
        let abort = task.abort_handle();

        match tokio::time::timeout(grace, task).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(join_err)) => Some(Err(ApplicationError::Panicked(join_err.to_string()))),
            Err(_) => {
                warn!(
                    "{} application still running after {:?}, aborting",
                    self.kind, grace
                );
                abort.abort();
                None
            }
        }
    }

    /// Abort the application task immediately
    pub fn abort(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RunningApplication {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::application_fn;
    use crate::message::Frame;
    use crate::scope::WebSocketScope;

    #[tokio::test]
    async fn test_messages_arrive_in_emission_order() {
        let (mut host, _inbound, outbound) = channel();

        for text in ["a", "b", "c"] {
            outbound.send(OutboundMessage::send_text(text)).await.unwrap();
        }
        drop(outbound);

        let mut seen = Vec::new();
        while let HostStep::Message(OutboundMessage::WebSocketSend(Frame::Text(text))) =
            host.step().await
        {
            seen.push(text);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_idle_after_all_events_pulled() {
        let app = application_fn(|_scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
            while let Some(event) = inbound.receive().await {
                if let InboundEvent::WebSocketReceive(frame) = event {
                    outbound.send(OutboundMessage::WebSocketSend(frame)).await?;
                }
            }
            Ok::<(), ApplicationError>(())
        });

        let mut running = launch(Arc::new(app), Scope::WebSocket(WebSocketScope::default()));
        running
            .deliver(InboundEvent::WebSocketReceive(Frame::Text("ping".into())))
            .unwrap();

        assert_eq!(
            running.host().step().await,
            HostStep::Message(OutboundMessage::send_text("ping"))
        );
        assert_eq!(running.host().step().await, HostStep::Idle);
        assert_eq!(running.host().pulled(), 1);

        let outcome = running.shutdown(Duration::from_secs(1)).await;
        assert!(matches!(outcome, Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_send_after_host_dropped_fails() {
        let (host, _inbound, outbound) = channel();
        drop(host);
        let result = outbound.send(OutboundMessage::LifespanStartupComplete).await;
        assert_eq!(result, Err(ChannelClosed));
    }

    #[tokio::test]
    async fn test_join_reports_application_error() {
        let app = application_fn(|_scope: Scope, _inbound: Inbound, _outbound: Outbound| async move {
            Err(ApplicationError::msg("boom"))
        });

        let mut running = launch(Arc::new(app), Scope::WebSocket(WebSocketScope::default()));
        assert_eq!(running.host().step().await, HostStep::Closed);

        let err = running.join(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
