// Call-recording handlers for asserting chain behavior

use keel_core::HandlerRef;
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every time one of its handler references is reached.
///
/// Handler references produced by one probe share a log, so the order in
/// which positions of a chain ran can be checked afterwards.
#[derive(Clone, Default)]
pub struct Probe {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Middleware that records `label` and continues
    pub fn labeled(&self, label: &str) -> HandlerRef {
        let calls = self.calls.clone();
        let label = label.to_string();
        HandlerRef::from_fn(move |_req, _res, next| {
            calls.lock().push(label.clone());
            next.call();
            Ok(())
        })
    }

    /// Middleware that records a call and continues
    pub fn continuing(&self) -> HandlerRef {
        self.labeled("continue")
    }

    /// Handler that records a call and sends `body`
    pub fn sending(&self, body: &str) -> HandlerRef {
        let calls = self.calls.clone();
        let body = body.to_string();
        HandlerRef::from_fn(move |_req, res, _next| {
            calls.lock().push(format!("send {}", body));
            res.text(body.clone());
            Ok(())
        })
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Recorded labels, oldest first
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn was_called(&self, label: &str) -> bool {
        self.calls.lock().iter().any(|call| call == label)
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}
