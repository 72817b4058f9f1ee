//! Scripted engine for retry tests.

use crate::engine::{
    status_response, Downstream, EventListeners, FailureHandler, ForwardOptions, ProxyBody,
    ProxyEngine, ProxyError, ProxyRequest, Responder, ResponseHandler,
};
use bytes::Bytes;
use hyper::{Response, StatusCode};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Fail,
    Respond(StatusCode),
}

#[derive(Debug, Clone)]
pub struct Dispatch {
    pub kind: &'static str,
    pub at: Instant,
}

/// Engine that answers each dispatch synchronously from a script.
///
/// Once the script runs out every dispatch fails.
#[derive(Clone, Default)]
pub struct MockEngine {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    listeners: EventListeners,
    script: Mutex<VecDeque<Outcome>>,
    dispatches: Mutex<Vec<Dispatch>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.inner.script.lock().extend(outcomes);
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.inner.dispatches.lock().clone()
    }

    pub fn response_handler_count(&self) -> usize {
        self.inner.listeners.response_handler_count()
    }

    pub fn dispatch_web(
        &self,
        path: &str,
        options: &Arc<ForwardOptions>,
    ) -> oneshot::Receiver<Response<ProxyBody>> {
        self.dispatch_web_with_responder(path, options).1
    }

    pub fn dispatch_web_with_responder(
        &self,
        path: &str,
        options: &Arc<ForwardOptions>,
    ) -> (Responder, oneshot::Receiver<Response<ProxyBody>>) {
        let (responder, rx) = Responder::channel();
        self.web(request(path), responder.clone(), Arc::clone(options));
        (responder, rx)
    }

    pub fn dispatch_ws(
        &self,
        path: &str,
        options: &Arc<ForwardOptions>,
    ) -> oneshot::Receiver<Response<ProxyBody>> {
        let (responder, rx) = Responder::channel();
        self.ws(request(path), responder, Arc::clone(options));
        rx
    }

    fn run(&self, kind: &'static str, request: Arc<ProxyRequest>, downstream: Downstream) {
        self.inner.dispatches.lock().push(Dispatch {
            kind,
            at: Instant::now(),
        });
        let outcome = self.inner.script.lock().pop_front().unwrap_or(Outcome::Fail);
        match outcome {
            Outcome::Fail => self.inner.listeners.emit_failure(
                ProxyError::InvalidTarget("connection refused".to_string()),
                request,
                downstream,
            ),
            Outcome::Respond(status) => {
                self.inner.listeners.emit_response(&request, status);
                let _ = downstream
                    .responder()
                    .send(status_response(status, "text/plain", "ok"));
            }
        }
    }
}

impl ProxyEngine for MockEngine {
    fn web(&self, request: Arc<ProxyRequest>, responder: Responder, _options: Arc<ForwardOptions>) {
        self.run("web", request, Downstream::Http(responder));
    }

    fn ws(&self, request: Arc<ProxyRequest>, responder: Responder, _options: Arc<ForwardOptions>) {
        self.run("ws", request, Downstream::WebSocket(responder));
    }

    fn on_failure(&self, handler: FailureHandler) {
        self.inner.listeners.on_failure(handler);
    }

    fn take_failure_handlers(&self) -> Vec<FailureHandler> {
        self.inner.listeners.take_failure_handlers()
    }

    fn failure_handler_count(&self) -> usize {
        self.inner.listeners.failure_handler_count()
    }

    fn on_response(&self, handler: ResponseHandler) {
        self.inner.listeners.on_response(handler);
    }
}

fn request(path: &str) -> Arc<ProxyRequest> {
    Arc::new(ProxyRequest::new(
        hyper::Request::builder()
            .uri(path)
            .body(Bytes::new())
            .unwrap(),
    ))
}
