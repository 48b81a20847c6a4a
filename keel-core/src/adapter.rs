//! Adapter from plain `(req, res, next)` callbacks to [`Handler`]s.
//!
//! Middleware written against the classic three-argument convention can be
//! registered through the same path as injectable handlers:
//!
//! ```
//! use keel_core::{HttpRequest, HttpResponse, Next, adapter::from_fn};
//!
//! let handler = from_fn(|req: &mut HttpRequest, _res: &mut HttpResponse, next: Next| {
//!     if req.header("authorization").is_some() {
//!         next.call();
//!     }
//!     Ok(())
//! });
//! # let _ = handler;
//! ```

use crate::logging::trace;
use crate::{Error, Flow, Handler, HandlerResult, HttpRequest, HttpResponse};
use async_trait::async_trait;
use tokio::sync::oneshot;

/// One-shot continuation signal handed to a callback.
///
/// Calling it tells the chain to run the next callback. It is consumed by
/// the call, so it can fire at most once. Dropping it without calling stops
/// the chain.
#[derive(Debug)]
pub struct Next {
    tx: oneshot::Sender<()>,
}

impl Next {
    /// Continue to the next registered callback
    pub fn call(self) {
        // The receiver only disappears if the dispatcher was cancelled.
        let _ = self.tx.send(());
    }
}

/// Handler built from a three-argument callback
pub struct CallbackHandler<F> {
    callback: F,
}

/// Wrap a `(req, res, next)` callback as a [`Handler`].
///
/// The resulting handler completes when the callback signals `next`
/// (continue) or drops it (stop). An `Err` returned by the callback
/// propagates unchanged.
pub fn from_fn<F>(callback: F) -> CallbackHandler<F>
where
    F: Fn(&mut HttpRequest, &mut HttpResponse, Next) -> Result<(), Error> + Send + Sync + 'static,
{
    CallbackHandler { callback }
}

#[async_trait]
impl<F> Handler for CallbackHandler<F>
where
    F: Fn(&mut HttpRequest, &mut HttpResponse, Next) -> Result<(), Error> + Send + Sync + 'static,
{
    async fn handle(&self, req: &mut HttpRequest, res: &mut HttpResponse) -> HandlerResult {
        let (tx, rx) = oneshot::channel();
        (self.callback)(req, res, Next { tx })?;

        // `next` may have been moved into a task that signals later.
        match rx.await {
            Ok(()) => Ok(Flow::Continue),
            Err(_) => {
                trace!(path = %req.path, "Callback dropped its continuation");
                Ok(Flow::Stop)
            }
        }
    }
}
