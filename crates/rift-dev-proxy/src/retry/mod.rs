//! Retry of proxied requests while the upstream is unreachable.
//!
//! # Module Structure
//!
//! - `policy` - resolution of route and default settings
//! - `delay` - delay between attempts
//! - `operation` - per-request attempt bookkeeping
//! - `interceptor` - replaces the default failure handling of an engine
//! - `replay` - delayed re-dispatch of a failed attempt
//! - `plugin` - applies retry to every route of a proxy table

mod delay;
mod interceptor;
mod operation;
mod plugin;
mod policy;
mod replay;

#[cfg(test)]
pub(crate) mod testing;

pub use delay::next_delay;
pub use interceptor::{wrap_configure, RetryInterceptor};
pub use operation::{FailureDecision, OperationTable, RetryableOperation};
pub use plugin::RetryPlugin;
pub use policy::RetryPolicy;
pub use replay::Replay;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetryError {
    /// The engine did not have exactly one default failure handler to take
    /// over, so retries cannot keep it from answering early.
    #[error(
        "route {route}: expected exactly one default failure handler on the proxy engine, found {found}"
    )]
    ListenerConflict { route: String, found: usize },
}
