//! Engine configuration.
//!
//! Every knob has a serde default, so a config file only needs the
//! fields it wants to override.

use serde::{Deserialize, Serialize};
use token_types::FailurePolicy;

/// Top-level configuration for a [`ResolutionEngine`](crate::ResolutionEngine).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cache layer settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Failure handling applied to every resolution in this engine
    #[serde(default)]
    pub failure: FailurePolicy,
    /// Token registry housekeeping
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Cache layer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Consult the shared key-value backend in addition to the local map
    #[serde(default = "default_remote_enabled")]
    pub remote_enabled: bool,
    /// Extra seconds an expired entry is kept around for stale serving
    #[serde(default = "default_stale_grace_secs")]
    pub stale_grace_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote_enabled: default_remote_enabled(),
            stale_grace_secs: default_stale_grace_secs(),
        }
    }
}

fn default_remote_enabled() -> bool {
    true
}

fn default_stale_grace_secs() -> u64 {
    300
}

/// Token registry housekeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Seconds a terminal token lingers before a sweep reclaims it
    #[serde(default = "default_sweep_grace_secs")]
    pub sweep_grace_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_grace_secs: default_sweep_grace_secs(),
        }
    }
}

fn default_sweep_grace_secs() -> u64 {
    600
}
