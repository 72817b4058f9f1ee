//! Retry configuration for proxied routes.

use serde::{Deserialize, Serialize};

/// Raw retry setting as written in the configuration file.
///
/// Accepts `true`, `false`, or a map of options:
///
/// ```yaml
/// retry:
///   maxTries: 5
///   delay: 250
///   maxDelay: 2000
///   backoff: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RetrySetting {
    /// `true` retries with the default options, `false` disables retrying
    Enabled(bool),
    /// Explicit options; missing fields fall back to the defaults
    Options(RetryOptions),
}

/// Retry options. Every field is optional and resolved per field.
///
/// Numeric fields are signed so that non-positive values written by the user
/// reach the policy resolver instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOptions {
    /// How often to try the request, including the initial attempt (default: 60)
    #[serde(default, alias = "max_tries", skip_serializing_if = "Option::is_none")]
    pub max_tries: Option<i64>,
    /// Initial delay in milliseconds before the next attempt (default: 1000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<i64>,
    /// Maximum delay in milliseconds before the next attempt (default: 30000)
    #[serde(default, alias = "max_delay", skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<i64>,
    /// Double the delay after every failed attempt (default: false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<bool>,
}
