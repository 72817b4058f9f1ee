//! Proxy engine.
//!
//! The engine forwards a buffered client request (or WebSocket upgrade) to
//! one upstream and reports the outcome through listeners:
//!
//! - failure listeners run when an attempt fails before the upstream
//!   answered, with the error, the request and the [`Downstream`]
//! - response listeners run when the upstream answered
//!
//! Failure handlers are managed explicitly (`on_failure`,
//! `take_failure_handlers`), so a component that needs to own failure
//! handling can capture whatever the host registered and decide when to call
//! it.

mod body;
mod default_handler;
mod downstream;
mod error;
mod events;
mod forward;
mod http;
mod options;
mod request;

pub use body::{empty_body, error_response, full_body, status_response, ProxyBody};
pub use default_handler::default_failure_handler;
pub use downstream::{Downstream, Responder};
pub use error::ProxyError;
pub use events::{EventListeners, FailureHandler, ResponseHandler};
pub use forward::build_upstream_request;
pub use http::HttpProxy;
pub use options::ForwardOptions;
pub use request::ProxyRequest;

use std::sync::Arc;

/// Capabilities the retry layer needs from a proxy engine.
pub trait ProxyEngine: Clone + Send + Sync + 'static {
    /// Forward an HTTP request; the outcome goes to `responder` or to the
    /// failure listeners.
    fn web(&self, request: Arc<ProxyRequest>, responder: Responder, options: Arc<ForwardOptions>);

    /// Forward a WebSocket upgrade.
    fn ws(&self, request: Arc<ProxyRequest>, responder: Responder, options: Arc<ForwardOptions>);

    fn on_failure(&self, handler: FailureHandler);

    /// Remove and return the registered failure handlers.
    fn take_failure_handlers(&self) -> Vec<FailureHandler>;

    fn failure_handler_count(&self) -> usize;

    fn on_response(&self, handler: ResponseHandler);
}
