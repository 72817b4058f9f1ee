//! Applies retry to the routes of a proxy table.

use super::interceptor::wrap_configure;
use super::policy::RetryPolicy;
use crate::config::RetrySetting;
use crate::engine::ProxyEngine;
use crate::proxy::ProxyTable;
use tracing::debug;

/// Wraps the configure hook of every route whose resolved policy retries.
///
/// `default_retry` applies to routes without their own `retry` setting.
#[derive(Debug, Clone, Default)]
pub struct RetryPlugin {
    default_retry: Option<RetrySetting>,
}

impl RetryPlugin {
    pub fn new(default_retry: Option<RetrySetting>) -> Self {
        Self { default_retry }
    }

    /// Must run before the host configures its engines; routes left disabled
    /// are returned unchanged.
    pub fn apply<E: ProxyEngine>(&self, mut table: ProxyTable<E>) -> ProxyTable<E> {
        for route in table.routes_mut() {
            let policy = RetryPolicy::resolve(route.retry.as_ref(), self.default_retry.as_ref());
            if !policy.is_enabled() {
                debug!("Retry disabled for {}", route.context);
                continue;
            }
            let original = route.configure.take();
            route.configure = Some(wrap_configure(&route.context, policy, original));
        }
        table
    }
}
