//! Delay between attempts.

use std::time::Duration;

/// Delay for the attempt after one that waited `current`.
///
/// Constant without backoff, doubled with backoff; never above `max_delay`.
pub fn next_delay(current: Duration, use_backoff: bool, max_delay: Duration) -> Duration {
    let next = if use_backoff {
        current.saturating_mul(2)
    } else {
        current
    };
    next.min(max_delay)
}
