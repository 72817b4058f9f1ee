//! DevProxyServer and its accept loop.
//!
//! The server owns one engine per route. Engines are configured once at bind
//! time; afterwards every request is matched against the routes in order and
//! handed to the engine of the first match.

use super::client::create_http_client;
use super::route::{ProxyTable, RouteContext};
use super::tls::create_tls_acceptor;
use crate::config::{Config, MetricsConfig, Protocol};
use crate::engine::{
    default_failure_handler, error_response, status_response, ForwardOptions, HttpProxy,
    ProxyBody, ProxyEngine, ProxyRequest, Responder,
};
use crate::metrics;
use anyhow::Context;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

pub struct DevProxyServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    protocol: Protocol,
    tls_acceptor: Option<TlsAcceptor>,
    state: Arc<ServerState>,
}

struct ServerState {
    routes: Vec<BoundRoute>,
    metrics: MetricsConfig,
}

struct BoundRoute {
    context: String,
    matcher: RouteContext,
    engine: HttpProxy,
    options: Arc<ForwardOptions>,
}

impl DevProxyServer {
    /// Bind the listener and set up one engine per route.
    ///
    /// Each engine gets the default failure handler, then the route's
    /// configure hook (if any) is called exactly once. A failing hook aborts
    /// startup.
    pub async fn bind(config: &Config, table: ProxyTable) -> anyhow::Result<Self> {
        let addr = format!("{}:{}", config.listen.host, config.listen.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let local_addr = listener.local_addr()?;

        let tls_acceptor = if config.listen.protocol == Protocol::Https {
            let tls = config.listen.tls.as_ref().ok_or_else(|| {
                anyhow::anyhow!("TLS configuration required for HTTPS listener")
            })?;
            Some(create_tls_acceptor(&tls.cert_path, &tls.key_path)?)
        } else {
            None
        };

        let client = create_http_client(&config.connection_pool, table.skip_tls_verify());
        let mut routes: Vec<BoundRoute> = Vec::with_capacity(table.len());
        for route in table.into_routes() {
            let engine = HttpProxy::new(client.clone());
            engine.on_failure(default_failure_handler());
            let options = Arc::new(route.options);

            if let Some(configure) = &route.configure {
                if let Err(e) = configure(&engine, &options) {
                    engine.close();
                    for bound in &routes {
                        bound.engine.close();
                    }
                    return Err(e.context(format!("Failed to configure route '{}'", route.context)));
                }
            }

            info!("Proxying {} -> {}", route.context, options.target);
            routes.push(BoundRoute {
                context: route.context,
                matcher: route.matcher,
                engine,
                options,
            });
        }

        Ok(Self {
            listener,
            local_addr,
            protocol: config.listen.protocol,
            tls_acceptor,
            state: Arc::new(ServerState {
                routes,
                metrics: config.metrics.clone(),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the process is stopped.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves. Connections in flight keep running.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Listening on {}://{}",
            self.protocol.as_str(),
            self.local_addr
        );
        if self.state.metrics.enabled {
            info!("Metrics available at {}", self.state.metrics.path);
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => self.spawn_connection(stream, remote_addr),
                        Err(e) => error!("Accept error on {}: {}", self.local_addr, e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Dev proxy on {} shutting down", self.local_addr);
                    break;
                }
            }
        }

        self.state.close();
        Ok(())
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, remote_addr: SocketAddr) {
        let state = Arc::clone(&self.state);
        let tls_acceptor = self.tls_acceptor.clone();

        tokio::spawn(async move {
            match tls_acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve(TokioIo::new(tls_stream), state, remote_addr).await,
                    Err(err) => error!("TLS handshake failed from {}: {}", remote_addr, err),
                },
                None => serve(TokioIo::new(stream), state, remote_addr).await,
            }
        });
    }
}

async fn serve<I>(io: I, state: Arc<ServerState>, remote_addr: SocketAddr)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let state = Arc::clone(&state);
        async move { state.handle(req).await }
    });

    if let Err(err) = http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        debug!("Error serving connection from {}: {}", remote_addr, err);
    }
}

impl ServerState {
    async fn handle(&self, req: Request<Incoming>) -> Result<Response<ProxyBody>, Infallible> {
        let method = req.method().clone();
        let response = self.dispatch(req).await;
        metrics::record_request(method.as_str(), response.status().as_u16());
        Ok(response)
    }

    async fn dispatch(&self, req: Request<Incoming>) -> Response<ProxyBody> {
        if self.metrics.enabled && req.uri().path() == self.metrics.path {
            return status_response(
                StatusCode::OK,
                "text/plain; version=0.0.4",
                metrics::collect_metrics(),
            );
        }

        let url = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let Some(route) = self.routes.iter().find(|route| route.matcher.matches(url)) else {
            debug!("No route for {} {}", req.method(), url);
            return error_response(StatusCode::NOT_FOUND, "No proxy route matches the request");
        };

        let request = match ProxyRequest::from_incoming(req).await {
            Ok(request) => Arc::new(request),
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Failed to read request body: {e}"),
                )
            }
        };

        let (responder, rx) = Responder::channel();
        if request.is_upgrade() && route.options.ws {
            debug!("{} upgrade {} via {}", request.id(), request.uri(), route.context);
            route
                .engine
                .ws(request, responder, Arc::clone(&route.options));
        } else {
            debug!(
                "{} {} {} via {}",
                request.id(),
                request.method(),
                request.uri(),
                route.context
            );
            route
                .engine
                .web(request, responder, Arc::clone(&route.options));
        }

        match rx.await {
            Ok(response) => response,
            Err(_) => error_response(
                StatusCode::BAD_GATEWAY,
                "Proxy dropped the request without a response",
            ),
        }
    }

    fn close(&self) {
        for route in &self.routes {
            route.engine.close();
        }
    }
}
