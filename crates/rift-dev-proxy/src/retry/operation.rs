//! Per-operation retry state.

use super::delay::next_delay;
use super::policy::RetryPolicy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Retry bookkeeping of one client request across its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryableOperation {
    /// Retries scheduled so far
    pub attempt: u32,
    /// Wait before the next retry
    pub current_delay: Duration,
}

impl RetryableOperation {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            current_delay: policy.first_delay(),
        }
    }
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Replay after `delay`; `attempt` is the 1-based retry number.
    Retry { attempt: u32, delay: Duration },
    /// No attempts left. The entry has been removed.
    Exhausted { attempts: u32 },
}

/// Side-table of in-flight operations keyed by request id.
///
/// Entries are created on the first failure of a request and removed on
/// success, exhaustion or abandonment, so the table only holds operations
/// that are waiting for a replay or for the outcome of one.
#[derive(Debug, Default)]
pub struct OperationTable {
    entries: Mutex<HashMap<Uuid, RetryableOperation>>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self, id: Uuid, policy: &RetryPolicy) -> FailureDecision {
        let mut entries = self.entries.lock();
        let state = entries
            .entry(id)
            .or_insert_with(|| RetryableOperation::new(policy));

        if state.attempt + 1 < policy.max_attempts {
            let delay = state.current_delay;
            state.attempt += 1;
            state.current_delay = next_delay(delay, policy.use_backoff, policy.max_delay);
            FailureDecision::Retry {
                attempt: state.attempt,
                delay,
            }
        } else {
            let attempts = state.attempt + 1;
            entries.remove(&id);
            FailureDecision::Exhausted { attempts }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<RetryableOperation> {
        self.entries.lock().get(id).copied()
    }

    pub fn remove(&self, id: &Uuid) -> Option<RetryableOperation> {
        self.entries.lock().remove(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
