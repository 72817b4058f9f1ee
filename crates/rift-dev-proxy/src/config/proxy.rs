//! Proxy route configuration.
//!
//! The `proxy` section maps route contexts to upstream targets:
//!
//! ```yaml
//! proxy:
//!   /api: http://localhost:3000          # shorthand
//!   /socket:
//!     target: ws://localhost:3001
//!     ws: true
//!     retry:
//!       maxTries: 10
//!       delay: 200
//!   "^/legacy/.*":                         # regex context
//!     target: http://localhost:4000
//!     retry: false
//! ```
//!
//! Contexts are matched in the order they appear in the file.

use super::retry::RetrySetting;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A single `proxy` entry: either a bare target or a full route object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ProxyEntry {
    Target(String),
    Route(ProxyRouteConfig),
}

impl ProxyEntry {
    /// Normalize the entry into a route configuration.
    ///
    /// Shorthand targets become `{ target, change_origin: true }`.
    pub fn into_route(self) -> ProxyRouteConfig {
        match self {
            ProxyEntry::Target(target) => ProxyRouteConfig {
                change_origin: true,
                ..ProxyRouteConfig::new(target)
            },
            ProxyEntry::Route(route) => route,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyRouteConfig {
    /// Upstream URL (http, https, ws or wss)
    pub target: String,
    /// Rewrite the Host header to the target's authority
    #[serde(default, alias = "changeOrigin")]
    pub change_origin: bool,
    /// Forward WebSocket upgrades on this route
    #[serde(default)]
    pub ws: bool,
    /// Verify the upstream TLS certificate (set false for self-signed certs)
    #[serde(default = "default_secure")]
    pub secure: bool,
    /// Extra headers added to every upstream request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Per-route retry override; falls back to the top-level `retry`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySetting>,
}

fn default_secure() -> bool {
    true
}

impl ProxyRouteConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            change_origin: false,
            ws: false,
            secure: default_secure(),
            headers: BTreeMap::new(),
            retry: None,
        }
    }
}

/// Ordered `context -> entry` mapping.
#[derive(Debug, Clone, Default)]
pub struct ProxyMap(Vec<(String, ProxyEntry)>);

impl ProxyMap {
    pub fn new(entries: Vec<(String, ProxyEntry)>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProxyEntry)> {
        self.0.iter().map(|(context, entry)| (context.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for ProxyMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProxyMapVisitor;

        impl<'de> Visitor<'de> for ProxyMapVisitor {
            type Value = ProxyMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of route contexts to proxy targets")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ProxyMap, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((context, entry)) = map.next_entry::<String, ProxyEntry>()? {
                    entries.push((context, entry));
                }
                Ok(ProxyMap(entries))
            }
        }

        deserializer.deserialize_map(ProxyMapVisitor)
    }
}

impl Serialize for ProxyMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(context, entry)| (context, entry)))
    }
}
