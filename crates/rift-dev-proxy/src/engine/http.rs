//! Hyper-backed proxy engine.

use super::body::{empty_body, error_response, ProxyBody};
use super::downstream::{Downstream, Responder};
use super::error::ProxyError;
use super::events::{EventListeners, FailureHandler, ResponseHandler};
use super::forward::build_upstream_request;
use super::options::ForwardOptions;
use super::request::ProxyRequest;
use super::ProxyEngine;
use crate::proxy::HttpClient;
use http_body_util::combinators::BoxBody;
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tracing::{debug, warn};

/// Forwards requests and WebSocket upgrades to one route's upstream.
///
/// Cheap to clone; clones share the client and the listeners.
#[derive(Clone)]
pub struct HttpProxy {
    inner: Arc<Inner>,
}

struct Inner {
    client: HttpClient,
    listeners: EventListeners,
}

impl HttpProxy {
    pub fn new(client: HttpClient) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                listeners: EventListeners::new(),
            }),
        }
    }

    /// Drop all listeners. Called when the server stops serving the route.
    pub fn close(&self) {
        self.inner.listeners.clear();
    }

    async fn forward_web(
        self,
        request: Arc<ProxyRequest>,
        responder: Responder,
        options: Arc<ForwardOptions>,
    ) {
        let upstream_req = match build_upstream_request(&request, &options, false) {
            Ok(req) => req,
            Err(e) => {
                return self
                    .inner
                    .listeners
                    .emit_failure(e, request, Downstream::Http(responder))
            }
        };

        debug!(
            "Forwarding {} {} -> {}",
            request.method(),
            request.uri(),
            upstream_req.uri()
        );

        match self.inner.client.request(upstream_req).await {
            Ok(response) => {
                self.inner
                    .listeners
                    .emit_response(&request, response.status());
                let response = response.map(BoxBody::new);
                if let Err(e) = responder.send(response) {
                    debug!("Dropping upstream response for {}: {}", request.uri(), e);
                }
            }
            Err(e) => self.inner.listeners.emit_failure(
                ProxyError::Upstream(e),
                request,
                Downstream::Http(responder),
            ),
        }
    }

    async fn forward_ws(
        self,
        request: Arc<ProxyRequest>,
        responder: Responder,
        options: Arc<ForwardOptions>,
    ) {
        if !request.has_pending_upgrade() {
            warn!(
                "{}: {}",
                ProxyError::MissingUpgrade,
                request.uri()
            );
            if let Err(e) = responder.send(error_response(
                StatusCode::BAD_REQUEST,
                "Expected a websocket upgrade request",
            )) {
                debug!("Could not reject upgrade: {}", e);
            }
            return;
        }

        let upstream_req = match build_upstream_request(&request, &options, true) {
            Ok(req) => req,
            Err(e) => {
                return self
                    .inner
                    .listeners
                    .emit_failure(e, request, Downstream::WebSocket(responder))
            }
        };

        debug!("Forwarding upgrade {} -> {}", request.uri(), upstream_req.uri());

        let mut response = match self.inner.client.request(upstream_req).await {
            Ok(response) => response,
            Err(e) => {
                return self.inner.listeners.emit_failure(
                    ProxyError::Upstream(e),
                    request,
                    Downstream::WebSocket(responder),
                )
            }
        };

        self.inner
            .listeners
            .emit_response(&request, response.status());

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            debug!(
                "Upstream declined upgrade for {} with {}",
                request.uri(),
                response.status()
            );
            if let Err(e) = responder.send(response.map(BoxBody::new)) {
                debug!("Dropping upstream response for {}: {}", request.uri(), e);
            }
            return;
        }

        let Some(client_upgrade) = request.take_upgrade() else {
            warn!("{}: {}", ProxyError::MissingUpgrade, request.uri());
            return;
        };
        let upstream_upgrade = hyper::upgrade::on(&mut response);
        let (parts, _) = response.into_parts();
        let handshake: Response<ProxyBody> = Response::from_parts(parts, empty_body());
        if let Err(e) = responder.send(handshake) {
            debug!("Client left during websocket handshake: {}", e);
            return;
        }

        match tokio::try_join!(client_upgrade, upstream_upgrade) {
            Ok((client_io, upstream_io)) => {
                let mut client_io = TokioIo::new(client_io);
                let mut upstream_io = TokioIo::new(upstream_io);
                match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
                    Ok((sent, received)) => debug!(
                        "Websocket {} closed ({} bytes up, {} bytes down)",
                        request.uri(),
                        sent,
                        received
                    ),
                    Err(e) => debug!("Websocket {} closed with error: {}", request.uri(), e),
                }
            }
            Err(e) => warn!("{}", ProxyError::Upgrade(e)),
        }
    }
}

impl ProxyEngine for HttpProxy {
    fn web(&self, request: Arc<ProxyRequest>, responder: Responder, options: Arc<ForwardOptions>) {
        tokio::spawn(self.clone().forward_web(request, responder, options));
    }

    fn ws(&self, request: Arc<ProxyRequest>, responder: Responder, options: Arc<ForwardOptions>) {
        tokio::spawn(self.clone().forward_ws(request, responder, options));
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
