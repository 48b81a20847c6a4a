// Handler capability: the unit a route resolves to

use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// What a handler wants to happen after it completes.
///
/// Handlers normally return `Flow::Auto` (or `().into()`): the chain carries
/// on exactly when the handler left the response unfinalized. `Continue` and
/// `Stop` override the inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    Continue,
    Stop,
    #[default]
    Auto,
}

impl Flow {
    /// Settle the decision against the response the handler left behind
    pub fn settle(self, res: &HttpResponse) -> Outcome {
        match self {
            Flow::Continue => Outcome::Continue,
            Flow::Stop => Outcome::Stop,
            Flow::Auto if res.is_finalized() => Outcome::Stop,
            Flow::Auto => Outcome::Continue,
        }
    }
}

impl From<()> for Flow {
    fn from(_: ()) -> Self {
        Flow::Auto
    }
}

/// Settled continuation decision for one callback in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Run the next matching callback
    Continue,
    /// The request is handled; nothing else in the chain runs
    Stop,
}

pub type HandlerResult = Result<Flow, Error>;

/// Trait for route handlers and middleware.
///
/// A handler gets exclusive access to the request and response for the
/// duration of the call. Returning `Err` (or panicking) is contained by the
/// dispatcher: the client sees a generic 500 and the chain stops.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, req: &mut HttpRequest, res: &mut HttpResponse) -> HandlerResult;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, req: &mut HttpRequest, res: &mut HttpResponse) -> HandlerResult {
        (**self).handle(req, res).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hello;

    #[async_trait]
    impl Handler for Hello {
        async fn handle(&self, _req: &mut HttpRequest, res: &mut HttpResponse) -> HandlerResult {
            res.text("hello");
            Ok(().into())
        }
    }

    #[test]
    fn test_auto_settles_on_finalization() {
        let mut res = HttpResponse::ok();
        assert_eq!(Flow::Auto.settle(&res), Outcome::Continue);
        res.end();
        assert_eq!(Flow::Auto.settle(&res), Outcome::Stop);
    }

    #[test]
    fn test_explicit_flow_wins() {
        let mut res = HttpResponse::ok();
        assert_eq!(Flow::Stop.settle(&res), Outcome::Stop);
        res.end();
        assert_eq!(Flow::Continue.settle(&res), Outcome::Continue);
    }

    #[tokio::test]
    async fn test_handler_through_arc() {
        let handler: Arc<dyn Handler> = Arc::new(Hello);
        let mut req = HttpRequest::new("GET", "/");
        let mut res = HttpResponse::ok();

        let flow = handler.handle(&mut req, &mut res).await.unwrap();
        assert_eq!(flow, Flow::Auto);
        assert_eq!(res.body_text(), "hello");
    }

    #[test]
    fn test_handler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn Handler>>();
    }
}
