//! Cost attribution primitives
//!
//! Every resolution carries a [`CostImpact`]: what it consumed (compute
//! units, vector queries, cache traffic) and what caching saved (prompt
//! tokens, resolver time). The engine's ledger aggregates these per
//! agent and globally; counters only ever grow.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-resolution cost deltas. All additions saturate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostImpact {
    /// Prompt tokens a cache hit avoided re-deriving
    pub tokens_saved: u64,
    /// Abstract resolver work units consumed
    pub compute_units: u64,
    /// Resolver wall time a cache hit avoided
    pub time_saved_ms: u64,
    pub cache_reads: u64,
    pub cache_writes: u64,
    pub vector_queries: u64,
}

impl CostImpact {
    pub fn merge(&mut self, other: &CostImpact) {
        self.tokens_saved = self.tokens_saved.saturating_add(other.tokens_saved);
        self.compute_units = self.compute_units.saturating_add(other.compute_units);
        self.time_saved_ms = self.time_saved_ms.saturating_add(other.time_saved_ms);
        self.cache_reads = self.cache_reads.saturating_add(other.cache_reads);
        self.cache_writes = self.cache_writes.saturating_add(other.cache_writes);
        self.vector_queries = self.vector_queries.saturating_add(other.vector_queries);
    }

    pub fn is_zero(&self) -> bool {
        *self == CostImpact::default()
    }

    /// Rough prompt-token estimate for a resolved value: rendered
    /// length over four, at least one.
    pub fn estimate_tokens(value: &Value) -> u64 {
        let rendered = match value {
            Value::String(s) => s.len(),
            other => serde_json::to_string(other).map(|s| s.len()).unwrap_or(0),
        };
        ((rendered as u64) / 4).max(1)
    }
}
