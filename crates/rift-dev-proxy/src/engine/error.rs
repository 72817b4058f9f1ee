//! Errors raised by the proxy engine.

/// Failure of a single forwarding attempt, or of delivering its response.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),
    #[error("invalid forwarded header {0}")]
    InvalidHeader(String),
    #[error("failed to build upstream request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("websocket upgrade failed: {0}")]
    Upgrade(#[source] hyper::Error),
    #[error("request carries no pending websocket upgrade")]
    MissingUpgrade,
    #[error("response has already been sent to the client")]
    AlreadyResponded,
    #[error("client disconnected before the response was sent")]
    ClientGone,
}
