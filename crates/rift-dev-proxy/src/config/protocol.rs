//! Protocol types for listeners and proxy targets.

use serde::{Deserialize, Serialize};

/// Protocol of a listener or a proxy target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP protocol
    #[default]
    Http,
    /// HTTPS protocol (HTTP over TLS)
    Https,
    /// WebSocket target (forwarded over HTTP)
    Ws,
    /// Secure WebSocket target (forwarded over HTTPS)
    Wss,
}

impl Protocol {
    /// Check if the protocol can be used for the dev server listener
    pub fn is_listener_supported(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }

    /// Get protocol name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
        }
    }

    /// Scheme used on the wire when talking to an upstream with this protocol
    pub fn upstream_scheme(&self) -> &'static str {
        match self {
            Protocol::Http | Protocol::Ws => "http",
            Protocol::Https | Protocol::Wss => "https",
        }
    }

    /// Parse protocol from URL scheme
    pub fn from_scheme(scheme: &str) -> Result<Self, String> {
        match scheme.to_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "ws" => Ok(Protocol::Ws),
            "wss" => Ok(Protocol::Wss),
            _ => Err(format!("Unsupported protocol scheme: {scheme}")),
        }
    }
}
