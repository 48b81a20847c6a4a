//! Dispatch wrapper: the callback bound into a route for each handler reference.
//!
//! A wrapper owns one resolution slot shared by every request that reaches
//! it. On each call it:
//!
//! 1. resolves its [`HandlerRef`] through the request's scope if the slot is
//!    still empty (single-flight; failures are not cached),
//! 2. forwards into a nested [`Server`] under a fresh child scope layered
//!    over that server's own scope, or
//! 3. invokes the handler, containing errors and panics, and settles the
//!    returned [`Flow`] into an [`Outcome`] for the route table.

use crate::handler_ref::{HandlerRef, Resolved};
use crate::logging::{debug, error, trace, warn};
use crate::{Container, Error, Flow, Handler, HttpRequest, HttpResponse, Outcome, Server};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Body sent when a handler fails; the error itself only goes to the log.
pub const GENERIC_FAILURE_BODY: &str = "Internal Server Error";

pub struct DispatchWrapper {
    reference: HandlerRef,
    resolved: OnceCell<Resolved>,
}

impl DispatchWrapper {
    /// Wrapper that resolves on the first matching request
    pub fn lazy(reference: HandlerRef) -> Self {
        Self {
            reference,
            resolved: OnceCell::new(),
        }
    }

    /// Wrapper resolved immediately against `scope`.
    ///
    /// Resolution has to complete without suspending; an asynchronous
    /// resolver that is still pending is reported as a resolution error.
    pub fn eager(reference: HandlerRef, scope: &Container) -> Result<Self, Error> {
        let resolved = reference.resolve(scope).now_or_never().ok_or_else(|| {
            Error::Resolution(format!(
                "{} resolves asynchronously and cannot be bound eagerly",
                reference.name()
            ))
        })??;
        debug!(handler = %reference.name(), kind = resolved.kind(), "Eagerly resolved handler");

        Ok(Self {
            reference,
            resolved: OnceCell::from(resolved),
        })
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.initialized()
    }

    /// Run this callback for one request
    pub async fn call(&self, req: &mut HttpRequest, res: &mut HttpResponse) -> Outcome {
        let resolved = match self.resolve(req.scope()).await {
            Ok(resolved) => resolved.clone(),
            Err(err) => {
                warn!(handler = %self.name(), error = %err, "Handler resolution failed");
                res.status(500).text(err.to_string());
                return Outcome::Stop;
            }
        };

        match resolved {
            Resolved::Mount(server) => self.forward(&server, req, res).await,
            Resolved::Handler(handler) => self.invoke(handler, req, res).await,
        }
    }

    async fn resolve(&self, scope: &Container) -> Result<&Resolved, Error> {
        self.resolved
            .get_or_try_init(|| {
                trace!(handler = %self.name(), depth = scope.depth(), "Resolving handler");
                self.reference.resolve(scope)
            })
            .await
    }

    /// Hand the request to a nested server under a child of the current scope.
    ///
    /// The child also sees the nested server's own scope, ahead of the
    /// request's chain, so lazy routes resolve against the same providers
    /// eager routes were bound with.
    async fn forward(
        &self,
        server: &Arc<Server>,
        req: &mut HttpRequest,
        res: &mut HttpResponse,
    ) -> Outcome {
        let parent = req.scope().clone();
        let child = parent.create_mounted_child(server.scope());
        trace!(path = %req.path, depth = child.depth(), "Forwarding into nested server");

        req.set_scope(child);
        let outcome = server.dispatch(req, res).await;
        req.set_scope(parent);
        outcome
    }

    async fn invoke(
        &self,
        handler: Arc<dyn Handler>,
        req: &mut HttpRequest,
        res: &mut HttpResponse,
    ) -> Outcome {
        let result = AssertUnwindSafe(handler.handle(req, res)).catch_unwind().await;

        let flow: Flow = match result {
            Ok(Ok(flow)) => flow,
            Ok(Err(err)) => return self.contain(err, res),
            Err(panic) => {
                let err = Error::HandlerExecution(panic_message(panic.as_ref()));
                return self.contain(err, res);
            }
        };

        let outcome = flow.settle(res);
        trace!(
            handler = %self.name(),
            flow = ?flow,
            outcome = ?outcome,
            finalized = res.is_finalized(),
            "Handler completed"
        );
        outcome
    }

    fn contain(&self, err: Error, res: &mut HttpResponse) -> Outcome {
        error!(handler = %self.name(), error = %err, "Handler failed");
        if res.is_finalized() {
            debug!(handler = %self.name(), "Response already sent before failure");
        } else {
            res.status(500).text(GENERIC_FAILURE_BODY);
        }
        Outcome::Stop
    }
}

impl std::fmt::Debug for DispatchWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchWrapper")
            .field("reference", &self.reference)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", msg)
    } else {
        "handler panicked".to_string()
    }
}
