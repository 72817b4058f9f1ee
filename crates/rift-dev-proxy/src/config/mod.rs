//! Configuration types for the Rift dev proxy.

mod listen;
mod protocol;
mod proxy;
mod retry;
mod upstream;

use std::path::Path;

use serde::{Deserialize, Serialize};

// Re-export all types for library consumers
pub use listen::{ListenConfig, MetricsConfig, TlsConfig};
pub use protocol::Protocol;
pub use proxy::{ProxyEntry, ProxyMap, ProxyRouteConfig};
pub use retry::{RetryOptions, RetrySetting};
pub use upstream::ConnectionPoolConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Default retry setting for routes that don't specify `retry`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySetting>,

    /// Route context -> proxy target, matched in file order
    #[serde(default)]
    pub proxy: ProxyMap,

    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.listen.protocol == Protocol::Https && self.listen.tls.is_none() {
            anyhow::bail!(
                "TLS configuration is required when listener protocol is 'https'. \
                 Please provide 'listen.tls.cert_path' and 'listen.tls.key_path'"
            );
        }

        if !self.listen.protocol.is_listener_supported() {
            anyhow::bail!(
                "Unsupported listener protocol: '{}'. Currently supported: http, https",
                self.listen.protocol.as_str()
            );
        }

        if self.proxy.is_empty() {
            anyhow::bail!("At least one entry is required in 'proxy'");
        }

        for (context, entry) in self.proxy.iter() {
            crate::proxy::RouteContext::parse(context)
                .map_err(|e| anyhow::anyhow!("Invalid route context '{context}': {e}"))?;

            let target = match entry {
                ProxyEntry::Target(target) => target,
                ProxyEntry::Route(route) => &route.target,
            };
            crate::engine::ForwardOptions::parse_target(target)
                .map_err(|e| anyhow::anyhow!("Invalid target for route '{context}': {e}"))?;
        }

        Ok(())
    }
}
