//! Lifespan cycle
//!
//! Startup runs before the invocation's HTTP or WebSocket cycle and shutdown
//! runs after it, whatever the cycle's outcome. [`LifespanCycle::scope`] is the
//! acquire/use/release wrapper the dispatcher uses.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use turul_relay_protocol::{
    InboundEvent, LifespanScope, OutboundMessage, RunningApplication, Scope, SharedApplication,
    launch,
};

use crate::config::LifespanMode;
use crate::error::{RelayError, Result};

/// Where the lifespan protocol stands for this invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifespanState {
    NotStarted,
    Started,
    Failed,
    /// The application does not speak lifespan (it returned without answering startup)
    Unsupported,
    Stopped,
}

/// Runs `lifespan.startup` / `lifespan.shutdown` around one invocation
pub struct LifespanCycle {
    app: SharedApplication,
    mode: LifespanMode,
    timeout: Duration,
    state: LifespanState,
    running: Option<RunningApplication>,
}

/// What the application answered to a handshake event
enum Answer {
    Complete,
    Failed(String),
    Returned(Option<String>),
    Unexpected(&'static str),
    TimedOut,
}

impl LifespanCycle {
    pub fn new(app: SharedApplication, mode: LifespanMode, timeout: Duration) -> Self {
        Self {
            app,
            mode,
            timeout,
            state: LifespanState::NotStarted,
            running: None,
        }
    }

    pub fn state(&self) -> LifespanState {
        self.state
    }

    /// Run `body` between startup and shutdown.
    ///
    /// With mode `off` no lifespan event is ever sent. With mode `on` a failed
    /// or unsupported startup returns the error and `body` never runs.
    /// Shutdown problems are logged and never replace `body`'s result.
    pub async fn scope<F, Fut, T>(mut self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.mode == LifespanMode::Off {
            return body().await;
        }

        if let Err(err) = self.startup().await {
            self.release().await;
            return Err(err);
        }

        let result = body().await;

        if let Err(err) = self.shutdown().await {
            error!("Lifespan shutdown failed: {}", err);
        }
        result
    }

    /// Send `lifespan.startup` and wait for the answer
    pub async fn startup(&mut self) -> Result<()> {
        if self.mode == LifespanMode::Off {
            return Ok(());
        }

        debug!("Starting lifespan ({} mode)", self.mode);
        let mut running = launch(
            self.app.clone(),
            Scope::Lifespan(LifespanScope::default()),
        );
        if running.deliver(InboundEvent::LifespanStartup).is_err() {
            self.state = LifespanState::Unsupported;
            return self.startup_outcome("application closed its lifespan channel".to_string());
        }

        let answer = self.wait_for_answer(&mut running).await;
        self.running = Some(running);

        match answer {
            Answer::Complete => {
                info!("Lifespan startup complete");
                self.state = LifespanState::Started;
                Ok(())
            }
            Answer::Failed(message) => {
                self.state = LifespanState::Failed;
                self.startup_outcome(format!("startup failed: {}", message))
            }
            Answer::Returned(reason) => {
                self.state = LifespanState::Unsupported;
                let reason = reason.unwrap_or_else(|| "application returned".to_string());
                self.startup_outcome(format!("lifespan protocol unsupported: {}", reason))
            }
            Answer::Unexpected(kind) => {
                self.state = LifespanState::Failed;
                self.startup_outcome(format!(
                    "protocol violation: unexpected {} during lifespan startup",
                    kind
                ))
            }
            Answer::TimedOut => {
                self.state = LifespanState::Failed;
                self.startup_outcome(format!("startup timed out after {:?}", self.timeout))
            }
        }
    }

    /// Send `lifespan.shutdown` (only after a completed startup) and release the application
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state != LifespanState::Started {
            self.release().await;
            return Ok(());
        }

        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        let outcome = if running.deliver(InboundEvent::LifespanShutdown).is_err() {
            Err(RelayError::Lifespan(
                "application closed its lifespan channel before shutdown".to_string(),
            ))
        } else {
            match self.wait_for_answer(&mut running).await {
                Answer::Complete => {
                    info!("Lifespan shutdown complete");
                    Ok(())
                }
                Answer::Failed(message) => {
                    Err(RelayError::Lifespan(format!("shutdown failed: {}", message)))
                }
                Answer::Returned(reason) => Err(RelayError::Lifespan(format!(
                    "application returned during shutdown: {}",
                    reason.unwrap_or_else(|| "no reason given".to_string())
                ))),
                Answer::Unexpected(kind) => Err(RelayError::violation(format!(
                    "unexpected {} during lifespan shutdown",
                    kind
                ))),
                Answer::TimedOut => Err(RelayError::Timeout(format!(
                    "lifespan shutdown after {:?}",
                    self.timeout
                ))),
            }
        };

        self.state = if outcome.is_ok() {
            LifespanState::Stopped
        } else {
            LifespanState::Failed
        };
        let _ = running.shutdown(self.timeout).await;
        outcome
    }

    /// Apply the mode policy to a failed startup
    fn startup_outcome(&self, message: String) -> Result<()> {
        match self.mode {
            LifespanMode::On => Err(RelayError::Lifespan(message)),
            _ => {
                warn!("Lifespan {}; continuing without it", message);
                Ok(())
            }
        }
    }

    async fn wait_for_answer(&self, running: &mut RunningApplication) -> Answer {
        match tokio::time::timeout(self.timeout, running.host().recv()).await {
            Err(_) => Answer::TimedOut,
            Ok(Some(OutboundMessage::LifespanStartupComplete))
            | Ok(Some(OutboundMessage::LifespanShutdownComplete)) => Answer::Complete,
            Ok(Some(OutboundMessage::LifespanStartupFailed { message }))
            | Ok(Some(OutboundMessage::LifespanShutdownFailed { message })) => {
                Answer::Failed(message)
            }
            Ok(Some(other)) => {
                error!("Protocol violation: {} sent on the lifespan scope", other.kind());
                Answer::Unexpected(other.kind())
            }
            Ok(None) => match running.join(self.timeout).await {
                Ok(()) => Answer::Returned(None),
                Err(err) => Answer::Returned(Some(err.to_string())),
            },
        }
    }

    async fn release(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown(self.timeout).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use turul_relay_protocol::{ApplicationError, Inbound, Outbound, application_fn};

    fn lifespan_app(fail_startup: bool) -> SharedApplication {
        Arc::new(application_fn(
            move |scope: Scope, mut inbound: Inbound, outbound: Outbound| async move {
                let Scope::Lifespan(_) = scope else {
                    return Err(ApplicationError::UnsupportedScope(scope.kind().into()));
                };
                while let Some(event) = inbound.receive().await {
                    match event {
                        InboundEvent::LifespanStartup if fail_startup => {
                            outbound
                                .send(OutboundMessage::LifespanStartupFailed {
                                    message: "database unreachable".into(),
                                })
                                .await?;
                        }
                        InboundEvent::LifespanStartup => {
                            outbound.send(OutboundMessage::LifespanStartupComplete).await?;
                        }
                        InboundEvent::LifespanShutdown => {
                            outbound.send(OutboundMessage::LifespanShutdownComplete).await?;
                            break;
                        }
                        _ => {}
                    }
                }
                Ok::<(), ApplicationError>(())
            },
        ))
    }

    fn no_lifespan_app() -> SharedApplication {
        Arc::new(application_fn(
            |scope: Scope, _inbound: Inbound, _outbound: Outbound| async move {
                Err::<(), _>(ApplicationError::UnsupportedScope(scope.kind().into()))
            },
        ))
    }

    #[tokio::test]
    async fn test_startup_and_shutdown() {
        let mut cycle = LifespanCycle::new(lifespan_app(false), LifespanMode::On, Duration::from_secs(1));

        cycle.startup().await.unwrap();
        assert_eq!(cycle.state(), LifespanState::Started);

        cycle.shutdown().await.unwrap();
        assert_eq!(cycle.state(), LifespanState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_startup_in_on_mode() {
        let mut cycle = LifespanCycle::new(lifespan_app(true), LifespanMode::On, Duration::from_secs(1));

        let err = cycle.startup().await.unwrap_err();
        assert!(matches!(err, RelayError::Lifespan(ref m) if m.contains("database unreachable")));
        assert_eq!(cycle.state(), LifespanState::Failed);
    }

    #[tokio::test]
    async fn test_failed_startup_in_auto_mode_continues() {
        let cycle = LifespanCycle::new(lifespan_app(true), LifespanMode::Auto, Duration::from_secs(1));
        let ran = cycle.scope(|| async { Ok(7) }).await.unwrap();
        assert_eq!(ran, 7);
    }

    fn silent_lifespan_app() -> SharedApplication {
        Arc::new(application_fn(
            |_scope: Scope, mut inbound: Inbound, _outbound: Outbound| async move {
                while inbound.receive().await.is_some() {}
                Ok::<(), ApplicationError>(())
            },
        ))
    }

    #[tokio::test]
    async fn test_startup_timeout_in_on_mode() {
        let mut cycle =
            LifespanCycle::new(silent_lifespan_app(), LifespanMode::On, Duration::from_millis(50));

        let err = cycle.startup().await.unwrap_err();
        assert!(matches!(err, RelayError::Lifespan(ref m) if m.contains("timed out")));
        assert_eq!(cycle.state(), LifespanState::Failed);
    }

    #[tokio::test]
    async fn test_startup_timeout_in_auto_mode_continues() {
        let cycle =
            LifespanCycle::new(silent_lifespan_app(), LifespanMode::Auto, Duration::from_millis(50));
        let ran = cycle.scope(|| async { Ok(7) }).await.unwrap();
        assert_eq!(ran, 7);
    }

    #[tokio::test]
    async fn test_unsupported_lifespan() {
        let mut cycle = LifespanCycle::new(no_lifespan_app(), LifespanMode::Auto, Duration::from_secs(1));
        cycle.startup().await.unwrap();
        assert_eq!(cycle.state(), LifespanState::Unsupported);

        let cycle = LifespanCycle::new(no_lifespan_app(), LifespanMode::On, Duration::from_secs(1));
        let body_runs = AtomicUsize::new(0);
        let result = cycle
            .scope(|| async {
                body_runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(RelayError::Lifespan(_))));
        assert_eq!(body_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_off_mode_never_launches() {
        let launches = Arc::new(AtomicUsize::new(0));
        let counter = launches.clone();
        let app: SharedApplication = Arc::new(application_fn(
            move |_scope: Scope, _inbound: Inbound, _outbound: Outbound| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<(), ApplicationError>(()) }
            },
        ));

        let cycle = LifespanCycle::new(app, LifespanMode::Off, Duration::from_secs(1));
        cycle.scope(|| async { Ok(()) }).await.unwrap();
        assert_eq!(launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_runs_after_body_error() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let counter = shutdowns.clone();
        let app: SharedApplication = Arc::new(application_fn(
            move |_scope: Scope, mut inbound: Inbound, outbound: Outbound| {
                let counter = counter.clone();
                async move {
                    while let Some(event) = inbound.receive().await {
                        match event {
                            InboundEvent::LifespanStartup => {
                                outbound.send(OutboundMessage::LifespanStartupComplete).await?
                            }
                            InboundEvent::LifespanShutdown => {
                                counter.fetch_add(1, Ordering::SeqCst);
                                outbound.send(OutboundMessage::LifespanShutdownComplete).await?;
                                break;
                            }
                            _ => {}
                        }
                    }
                    Ok::<(), ApplicationError>(())
                }
            },
        ));

        let cycle = LifespanCycle::new(app, LifespanMode::On, Duration::from_secs(1));
        let result: Result<()> = cycle
            .scope(|| async { Err(RelayError::violation("cycle failed")) })
            .await;

        assert!(matches!(result, Err(RelayError::ProtocolViolation(_))));
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }
}
