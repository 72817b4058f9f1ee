//! Per-route forwarding options passed to every engine call.

use super::error::ProxyError;
use crate::config::{Protocol, ProxyRouteConfig};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Uri;

#[derive(Debug, Clone)]
pub struct ForwardOptions {
    /// Upstream base URI, scheme already mapped to http/https
    pub target: Uri,
    pub change_origin: bool,
    pub ws: bool,
    pub secure: bool,
    /// Added to (and overriding) the client headers on every attempt
    pub headers: HeaderMap,
}

impl ForwardOptions {
    pub fn new(target: Uri) -> Self {
        Self {
            target,
            change_origin: false,
            ws: false,
            secure: true,
            headers: HeaderMap::new(),
        }
    }

    pub fn from_route(route: &ProxyRouteConfig) -> Result<Self, ProxyError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &route.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProxyError::InvalidHeader(format!("name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ProxyError::InvalidHeader(format!("value '{value}': {e}")))?;
            headers.insert(name, value);
        }

        Ok(Self {
            target: Self::parse_target(&route.target)?,
            change_origin: route.change_origin,
            ws: route.ws,
            secure: route.secure,
            headers,
        })
    }

    /// Parse a configured target, rejecting relative URIs and unknown schemes.
    ///
    /// `ws://` and `wss://` are rewritten to `http://` and `https://`.
    pub fn parse_target(target: &str) -> Result<Uri, ProxyError> {
        let uri: Uri = target
            .parse()
            .map_err(|e| ProxyError::InvalidTarget(format!("'{target}': {e}")))?;

        let scheme = uri
            .scheme_str()
            .ok_or_else(|| ProxyError::InvalidTarget(format!("'{target}' has no scheme")))?;
        let protocol = Protocol::from_scheme(scheme).map_err(ProxyError::InvalidTarget)?;
        let authority = uri
            .authority()
            .ok_or_else(|| ProxyError::InvalidTarget(format!("'{target}' has no host")))?;

        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!(
            "{}://{}{}",
            protocol.upstream_scheme(),
            authority,
            path_and_query
        )
        .parse()
        .map_err(|e| ProxyError::InvalidTarget(format!("'{target}': {e}")))
    }

    /// Join the target base path with the client path and query.
    pub fn upstream_uri(&self, client_uri: &Uri) -> Result<Uri, ProxyError> {
        let scheme = self.target.scheme_str().unwrap_or("http");
        let authority = self
            .target
            .authority()
            .map(|a| a.as_str())
            .ok_or_else(|| ProxyError::InvalidTarget(self.target.to_string()))?;
        let base = self.target.path().trim_end_matches('/');
        let client_path = client_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        format!("{scheme}://{authority}{base}{client_path}")
            .parse()
            .map_err(|e| ProxyError::InvalidTarget(format!("{e}")))
    }

    /// Authority of the target, used as Host when `change_origin` is set.
    pub fn target_authority(&self) -> Option<&str> {
        self.target.authority().map(|a| a.as_str())
    }
}
