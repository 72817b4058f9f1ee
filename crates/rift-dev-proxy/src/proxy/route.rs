//! Proxy routes built from the `proxy` section of the configuration.

use crate::config::{Config, RetrySetting};
use crate::engine::{ForwardOptions, HttpProxy, ProxyEngine};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Called once per route with the route's engine before traffic is served.
pub type ConfigureHook<E = HttpProxy> =
    Arc<dyn Fn(&E, &Arc<ForwardOptions>) -> anyhow::Result<()> + Send + Sync>;

/// Which request paths a route serves.
///
/// Contexts starting with `^` are regular expressions, everything else is a
/// path prefix.
#[derive(Debug, Clone)]
pub enum RouteContext {
    Prefix(String),
    Pattern(Regex),
}

impl RouteContext {
    pub fn parse(context: &str) -> Result<Self, regex::Error> {
        if context.starts_with('^') {
            Ok(RouteContext::Pattern(Regex::new(context)?))
        } else {
            Ok(RouteContext::Prefix(context.to_string()))
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            RouteContext::Prefix(prefix) => path.starts_with(prefix.as_str()),
            RouteContext::Pattern(re) => re.is_match(path),
        }
    }
}

pub struct ProxyRoute<E: ProxyEngine = HttpProxy> {
    pub context: String,
    pub matcher: RouteContext,
    pub options: ForwardOptions,
    /// Route-level retry setting, if the entry had one
    pub retry: Option<RetrySetting>,
    pub configure: Option<ConfigureHook<E>>,
}

impl<E: ProxyEngine> fmt::Debug for ProxyRoute<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRoute")
            .field("context", &self.context)
            .field("target", &self.options.target)
            .field("retry", &self.retry)
            .field("configure", &self.configure.is_some())
            .finish()
    }
}

/// Ordered routes; the first matching route serves a request.
pub struct ProxyTable<E: ProxyEngine = HttpProxy> {
    routes: Vec<ProxyRoute<E>>,
}

impl<E: ProxyEngine> Default for ProxyTable<E> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<E: ProxyEngine> ProxyTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the `proxy` section, normalizing shorthand
    /// targets to `{ target, change_origin: true }`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut table = Self::new();
        for (context, entry) in config.proxy.iter() {
            let route = entry.clone().into_route();
            let matcher = RouteContext::parse(context)
                .map_err(|e| anyhow::anyhow!("Invalid route context '{context}': {e}"))?;
            let options = ForwardOptions::from_route(&route)
                .map_err(|e| anyhow::anyhow!("Invalid route '{context}': {e}"))?;
            table.push(ProxyRoute {
                context: context.to_string(),
                matcher,
                options,
                retry: route.retry,
                configure: None,
            });
        }
        Ok(table)
    }

    pub fn push(&mut self, route: ProxyRoute<E>) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[ProxyRoute<E>] {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut [ProxyRoute<E>] {
        &mut self.routes
    }

    pub fn into_routes(self) -> Vec<ProxyRoute<E>> {
        self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Upstream certificates go unchecked when any route sets `secure: false`.
    pub fn skip_tls_verify(&self) -> bool {
        self.routes.iter().any(|route| !route.options.secure)
    }
}
