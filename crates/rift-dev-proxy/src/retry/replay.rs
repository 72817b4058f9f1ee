//! Delayed re-dispatch of a failed attempt.

use super::operation::OperationTable;
use crate::engine::{Downstream, ForwardOptions, ProxyEngine, ProxyRequest};
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A replay waiting for its delay to elapse.
pub struct Replay<E: ProxyEngine> {
    pub route: String,
    pub engine: E,
    pub request: Arc<ProxyRequest>,
    pub downstream: Downstream,
    pub options: Arc<ForwardOptions>,
    pub operations: Arc<OperationTable>,
}

impl<E: ProxyEngine> Replay<E> {
    /// Sleep for `delay`, then re-issue the operation.
    pub fn spawn(self, delay: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            self.fire();
        })
    }

    /// Re-issue the operation now, unless the client response can no longer
    /// be written.
    pub fn fire(self) {
        let responder = self.downstream.responder();
        if responder.headers_sent() {
            warn!(
                "Cannot retry {} {}: sending the response has already started",
                self.request.method(),
                self.request.uri()
            );
            self.abandon("headers_sent");
            return;
        }
        if responder.is_closed() {
            warn!(
                "Cannot retry {} {}: client disconnected",
                self.request.method(),
                self.request.uri()
            );
            self.abandon("client_gone");
            return;
        }

        debug!(
            "Replaying {} {} on route {}",
            self.request.method(),
            self.request.uri(),
            self.route
        );
        match self.downstream {
            Downstream::Http(responder) => self.engine.web(self.request, responder, self.options),
            Downstream::WebSocket(responder) => {
                self.engine.ws(self.request, responder, self.options)
            }
        }
    }

    fn abandon(&self, reason: &str) {
        self.operations.remove(&self.request.id());
        metrics::record_replay_abandoned(&self.route, reason);
    }
}
