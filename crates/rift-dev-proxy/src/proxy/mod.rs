//! Dev server hosting the proxy routes.
//!
//! # Module Structure
//!
//! - `route` - route table built from configuration, context matching
//! - `server` - DevProxyServer and its accept loop
//! - `client` - shared pooled upstream client
//! - `tls` - listener TLS and the no-op verifier for `secure: false`

mod client;
mod route;
mod server;
mod tls;

pub use client::{create_http_client, HttpClient};
pub use route::{ConfigureHook, ProxyRoute, ProxyTable, RouteContext};
pub use server::DevProxyServer;
pub use tls::{create_tls_acceptor, install_crypto_provider, NoVerifier};
