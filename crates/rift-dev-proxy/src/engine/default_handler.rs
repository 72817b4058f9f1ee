//! Failure behavior the dev server installs on every engine.

use super::body::{empty_body, status_response};
use super::downstream::Downstream;
use super::error::ProxyError;
use super::events::FailureHandler;
use super::request::ProxyRequest;
use hyper::header::{HeaderValue, CONNECTION};
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};

/// HTTP failures answer `500 text/plain` with an empty body, unless the
/// response already started. WebSocket failures tear the connection down.
pub fn default_failure_handler() -> FailureHandler {
    Arc::new(
        |error: &ProxyError, request: &Arc<ProxyRequest>, downstream: &Downstream| {
            match downstream {
                Downstream::Http(responder) => {
                    error!(
                        "http proxy error: {} {}: {}",
                        request.method(),
                        request.uri(),
                        error
                    );
                    if responder.is_started() {
                        return;
                    }
                    if let Err(e) = responder.send(status_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "text/plain",
                        "",
                    )) {
                        debug!("Could not deliver proxy error response: {}", e);
                    }
                }
                Downstream::WebSocket(responder) => {
                    error!("ws proxy error: {}: {}", request.uri(), error);
                    if responder.is_started() {
                        return;
                    }
                    let mut response = Response::new(empty_body());
                    *response.status_mut() = StatusCode::BAD_GATEWAY;
                    response
                        .headers_mut()
                        .insert(CONNECTION, HeaderValue::from_static("close"));
                    if let Err(e) = responder.send(response) {
                        debug!("Could not tear down websocket: {}", e);
                    }
                }
            }
        },
    )
}
