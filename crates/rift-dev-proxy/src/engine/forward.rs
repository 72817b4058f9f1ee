//! Building upstream requests from buffered client requests.

use super::body::{full_body, ProxyBody};
use super::error::ProxyError;
use super::options::ForwardOptions;
use super::request::ProxyRequest;
use hyper::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST, UPGRADE};
use hyper::Request;

/// Headers that describe one connection and are never forwarded as-is.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Build the request for one upstream attempt.
///
/// With `upgrade` set the `Connection`/`Upgrade` pair is kept so the upstream
/// sees a WebSocket handshake.
pub fn build_upstream_request(
    request: &ProxyRequest,
    options: &ForwardOptions,
    upgrade: bool,
) -> Result<Request<ProxyBody>, ProxyError> {
    let uri = options.upstream_uri(request.uri())?;
    let mut builder = Request::builder().method(request.method().clone()).uri(uri);

    let headers = builder
        .headers_mut()
        .ok_or_else(|| ProxyError::InvalidTarget(options.target.to_string()))?;

    for (name, value) in request.headers() {
        if is_hop_by_hop(name) || name == CONTENT_LENGTH {
            continue;
        }
        if name == HOST && options.change_origin {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if options.change_origin {
        if let Some(authority) = options.target_authority() {
            let host = HeaderValue::from_str(authority)
                .map_err(|e| ProxyError::InvalidHeader(format!("host '{authority}': {e}")))?;
            headers.insert(HOST, host);
        }
    }

    if upgrade {
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        if let Some(protocol) = request.headers().get(UPGRADE) {
            headers.insert(UPGRADE, protocol.clone());
        }
    }

    for (name, value) in &options.headers {
        headers.insert(name.clone(), value.clone());
    }

    Ok(builder.body(full_body(request.body().clone()))?)
}
