//! Failure handling policy for resolver execution
//!
//! Every resolver invocation runs under a [`FailurePolicy`]: bounded
//! retries with multiplicative backoff inside a hard time budget, and
//! one of five terminal behaviors when the budget or retries run out.

use crate::id::ResolverId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Value substituted for a dependency that failed or is missing when
/// the policy mode is `DependencySkip`
pub const DEPENDENCY_SENTINEL: &str = "[unresolved-dependency]";

// ── Failure Mode ─────────────────────────────────────────────────────

/// What happens when retries are exhausted or the budget expires
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Substitute the policy's default value and flag the result degraded
    GracefulDegradation,
    /// Try the policy's fallback resolvers in order
    FallbackResolver,
    /// Serve an expired cache entry if one exists
    CacheStaleOk,
    /// Dependents of a failed token resolve with the sentinel value
    DependencySkip,
    /// Surface the error to the caller unchanged
    ErrorPropagation,
}

impl std::fmt::Display for FailureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureMode::GracefulDegradation => "graceful-degradation",
            FailureMode::FallbackResolver => "fallback-resolver",
            FailureMode::CacheStaleOk => "cache-stale-ok",
            FailureMode::DependencySkip => "dependency-skip",
            FailureMode::ErrorPropagation => "error-propagation",
        };
        write!(f, "{}", name)
    }
}

// ── Failure Policy ───────────────────────────────────────────────────

/// Retry, timeout, and terminal behavior for resolver execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailurePolicy {
    pub mode: FailureMode,
    /// Retries after the first attempt; `0` means exactly one attempt
    pub max_retries: u32,
    /// Multiplier applied per attempt to the backoff delay; values
    /// below 1.0 are treated as 1.0
    pub backoff_multiplier: f64,
    /// Hard budget for the whole attempt sequence, retries included
    pub timeout_ms: u64,
    /// Resolver ids tried in order under `FallbackResolver`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_resolvers: Vec<ResolverId>,
    /// Serve an expired cache entry on resolver failure, whatever the mode
    #[serde(default)]
    pub allow_stale_cache: bool,
    /// Substituted under `GracefulDegradation`; JSON null when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            mode: FailureMode::ErrorPropagation,
            max_retries: 2,
            backoff_multiplier: 2.0,
            timeout_ms: 5_000,
            fallback_resolvers: Vec::new(),
            allow_stale_cache: false,
            default_value: None,
        }
    }
}

impl FailurePolicy {
    const BACKOFF_BASE_MS: f64 = 50.0;

    pub fn with_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_fallback(mut self, resolver: ResolverId) -> Self {
        self.fallback_resolvers.push(resolver);
        self
    }

    pub fn allow_stale(mut self) -> Self {
        self.allow_stale_cache = true;
        self
    }

    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Delay before retry `attempt` (0-based), bounded by the budget
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.max(1.0);
        let ms = Self::BACKOFF_BASE_MS * multiplier.powi(attempt as i32);
        Duration::from_millis(ms.min(self.timeout_ms as f64) as u64)
    }

    /// The whole-sequence time budget
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
