//! Buffered client requests that can be forwarded more than once.

use http_body_util::BodyExt;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, CONNECTION, UPGRADE};
use hyper::upgrade::OnUpgrade;
use hyper::{Method, Request, Uri, Version};
use parking_lot::Mutex;
use uuid::Uuid;

/// A client request held by the proxy for the lifetime of one operation.
///
/// The body is collected up front so every attempt sends the same bytes.
/// The `id` identifies the operation across retries.
pub struct ProxyRequest {
    id: Uuid,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    upgrade: Mutex<Option<OnUpgrade>>,
}

impl ProxyRequest {
    /// Build from an already buffered request (no pending upgrade).
    pub fn new(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            id: Uuid::new_v4(),
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            upgrade: Mutex::new(None),
        }
    }

    /// Collect an incoming request, keeping hold of its upgrade if it asks for one.
    pub async fn from_incoming(mut request: Request<Incoming>) -> Result<Self, hyper::Error> {
        let upgrade = if is_upgrade_request(request.headers()) {
            Some(hyper::upgrade::on(&mut request))
        } else {
            None
        };

        let (parts, body) = request.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(Self {
            id: Uuid::new_v4(),
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            upgrade: Mutex::new(upgrade),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the client asked to switch protocols.
    pub fn is_upgrade(&self) -> bool {
        is_upgrade_request(&self.headers)
    }

    /// Whether the client side of the upgrade is still available.
    pub fn has_pending_upgrade(&self) -> bool {
        self.upgrade.lock().is_some()
    }

    /// Take the client side of the upgrade. Only the attempt that
    /// completes the handshake should call this.
    pub fn take_upgrade(&self) -> Option<OnUpgrade> {
        self.upgrade.lock().take()
    }
}

impl std::fmt::Debug for ProxyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("body_len", &self.body.len())
            .field("upgrade", &self.has_pending_upgrade())
            .finish()
    }
}

fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && headers.contains_key(UPGRADE)
}
