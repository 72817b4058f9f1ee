//! Listener registry for engine events.

use super::downstream::Downstream;
use super::error::ProxyError;
use super::request::ProxyRequest;
use hyper::StatusCode;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::error;

/// Called when a forwarding attempt fails.
pub type FailureHandler = Arc<dyn Fn(&ProxyError, &Arc<ProxyRequest>, &Downstream) + Send + Sync>;

/// Called when the upstream answered an attempt (any status).
pub type ResponseHandler = Arc<dyn Fn(&ProxyRequest, StatusCode) + Send + Sync>;

/// Failure and response listeners of one engine.
///
/// Handlers are snapshotted before they run, so a handler may re-enter the
/// engine (and register or emit) without deadlocking.
#[derive(Default)]
pub struct EventListeners {
    failure: RwLock<Vec<FailureHandler>>,
    response: RwLock<Vec<ResponseHandler>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_failure(&self, handler: FailureHandler) {
        self.failure.write().push(handler);
    }

    /// Remove and return every failure handler, in registration order.
    pub fn take_failure_handlers(&self) -> Vec<FailureHandler> {
        std::mem::take(&mut *self.failure.write())
    }

    pub fn failure_handler_count(&self) -> usize {
        self.failure.read().len()
    }

    pub fn on_response(&self, handler: ResponseHandler) {
        self.response.write().push(handler);
    }

    pub fn response_handler_count(&self) -> usize {
        self.response.read().len()
    }

    pub fn emit_failure(
        &self,
        error: ProxyError,
        request: Arc<ProxyRequest>,
        downstream: Downstream,
    ) {
        let handlers = self.failure.read().clone();
        if handlers.is_empty() {
            error!(
                "Unhandled proxy error for {} {}: {}",
                request.method(),
                request.uri(),
                error
            );
            return;
        }
        for handler in &handlers {
            handler(&error, &request, &downstream);
        }
    }

    pub fn emit_response(&self, request: &ProxyRequest, status: StatusCode) {
        let handlers = self.response.read().clone();
        for handler in &handlers {
            handler(request, status);
        }
    }

    /// Drop every listener. Breaks reference cycles between an engine and
    /// handlers that hold a clone of it.
    pub fn clear(&self) {
        self.failure.write().clear();
        self.response.write().clear();
    }
}
