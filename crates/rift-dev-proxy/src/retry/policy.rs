//! Resolution of raw retry settings into a policy.

use crate::config::{RetryOptions, RetrySetting};
use std::time::Duration;

pub const DEFAULT_MAX_TRIES: u32 = 60;
pub const DEFAULT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Fully resolved retry policy of one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; 1 means no retries
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub use_backoff: bool,
}

impl RetryPolicy {
    pub const DISABLED: RetryPolicy = RetryPolicy {
        max_attempts: 1,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        use_backoff: false,
    };

    /// Policy used for `retry: true`.
    pub const DEFAULTS: RetryPolicy = RetryPolicy {
        max_attempts: DEFAULT_MAX_TRIES,
        initial_delay: Duration::from_millis(DEFAULT_DELAY_MS),
        max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        use_backoff: false,
    };

    /// Resolve the route setting, falling back to the process-wide default
    /// when the route has none.
    ///
    /// A route's explicit `false` wins over an enabled default.
    pub fn resolve(route: Option<&RetrySetting>, fallback: Option<&RetrySetting>) -> Self {
        match route.or(fallback) {
            None | Some(RetrySetting::Enabled(false)) => Self::DISABLED,
            Some(RetrySetting::Enabled(true)) => Self::DEFAULTS,
            Some(RetrySetting::Options(options)) => Self::from_options(options),
        }
    }

    /// Fill every missing field from the defaults.
    ///
    /// `maxTries <= 1` disables retrying; negative delays count as zero.
    pub fn from_options(options: &RetryOptions) -> Self {
        let max_attempts = options
            .max_tries
            .map(|tries| tries.clamp(1, u32::MAX as i64) as u32)
            .unwrap_or(DEFAULT_MAX_TRIES);

        Self {
            max_attempts,
            initial_delay: millis(options.delay, DEFAULT_DELAY_MS),
            max_delay: millis(options.max_delay, DEFAULT_MAX_DELAY_MS),
            use_backoff: options.backoff.unwrap_or(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }

    /// Delay before the first retry.
    pub fn first_delay(&self) -> Duration {
        self.initial_delay.min(self.max_delay)
    }
}

fn millis(value: Option<i64>, default: u64) -> Duration {
    Duration::from_millis(value.map(|ms| ms.max(0) as u64).unwrap_or(default))
}
