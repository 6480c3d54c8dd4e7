//! The application side of the protocol

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::{Inbound, Outbound};
use crate::error::ApplicationError;
use crate::scope::Scope;

/// An async application driven by a host.
///
/// The application is called once per scope. It must return when the host
/// closes the inbound queue (`Inbound::receive` returns `None`).
#[async_trait]
pub trait Application: Send + Sync + 'static {
    async fn call(
        &self,
        scope: Scope,
        inbound: Inbound,
        outbound: Outbound,
    ) -> Result<(), ApplicationError>;
}

/// Shared application handle used by hosts
pub type SharedApplication = Arc<dyn Application>;

/// Application built from a closure, see [`application_fn`]
#[derive(Clone)]
pub struct ApplicationFn<F> {
    f: F,
}

/// Wrap an async closure as an [`Application`]
pub fn application_fn<F, Fut>(f: F) -> ApplicationFn<F>
where
    F: Fn(Scope, Inbound, Outbound) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ApplicationError>> + Send + 'static,
{
    ApplicationFn { f }
}

#[async_trait]
impl<F, Fut> Application for ApplicationFn<F>
where
    F: Fn(Scope, Inbound, Outbound) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ApplicationError>> + Send + 'static,
{
    async fn call(
        &self,
        scope: Scope,
        inbound: Inbound,
        outbound: Outbound,
    ) -> Result<(), ApplicationError> {
        (self.f)(scope, inbound, outbound).await
    }
}
