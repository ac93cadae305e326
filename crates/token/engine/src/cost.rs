//! Cost attribution ledger.
//!
//! Per-agent and global counters over everything the engine resolves.
//! Counters are monotonic atomics: concurrent layers record without
//! locking, and nothing decrements outside [`CostLedger::reset`],
//! which only engine teardown calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use token_types::{AgentId, CostImpact, ResolutionMetadata};

/// Bucket for resolutions whose context carried an empty agent id.
pub const UNATTRIBUTED_AGENT: &str = "unattributed";

#[derive(Default)]
struct Counters {
    resolutions: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    failures: AtomicU64,
    tokens_saved: AtomicU64,
    compute_units: AtomicU64,
    time_saved_ms: AtomicU64,
    cache_reads: AtomicU64,
    cache_writes: AtomicU64,
    vector_queries: AtomicU64,
}

impl Counters {
    fn apply(&self, metadata: &ResolutionMetadata) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        // hit/miss counters only move when the cache was consulted
        if metadata.cache_tier.is_some() {
            if metadata.cache_hit {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
            } else {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.apply_cost(&metadata.cost);
    }

    fn apply_cost(&self, cost: &CostImpact) {
        self.tokens_saved.fetch_add(cost.tokens_saved, Ordering::Relaxed);
        self.compute_units.fetch_add(cost.compute_units, Ordering::Relaxed);
        self.time_saved_ms.fetch_add(cost.time_saved_ms, Ordering::Relaxed);
        self.cache_reads.fetch_add(cost.cache_reads, Ordering::Relaxed);
        self.cache_writes.fetch_add(cost.cache_writes, Ordering::Relaxed);
        self.vector_queries.fetch_add(cost.vector_queries, Ordering::Relaxed);
    }

    fn apply_failure(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CostTotals {
        CostTotals {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            tokens_saved: self.tokens_saved.load(Ordering::Relaxed),
            compute_units: self.compute_units.load(Ordering::Relaxed),
            time_saved_ms: self.time_saved_ms.load(Ordering::Relaxed),
            cache_reads: self.cache_reads.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            vector_queries: self.vector_queries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time totals for one attribution bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTotals {
    pub resolutions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub failures: u64,
    pub tokens_saved: u64,
    pub compute_units: u64,
    pub time_saved_ms: u64,
    pub cache_reads: u64,
    pub cache_writes: u64,
    pub vector_queries: u64,
}

impl CostTotals {
    pub fn add(&mut self, other: &CostTotals) {
        self.resolutions = self.resolutions.saturating_add(other.resolutions);
        self.cache_hits = self.cache_hits.saturating_add(other.cache_hits);
        self.cache_misses = self.cache_misses.saturating_add(other.cache_misses);
        self.failures = self.failures.saturating_add(other.failures);
        self.tokens_saved = self.tokens_saved.saturating_add(other.tokens_saved);
        self.compute_units = self.compute_units.saturating_add(other.compute_units);
        self.time_saved_ms = self.time_saved_ms.saturating_add(other.time_saved_ms);
        self.cache_reads = self.cache_reads.saturating_add(other.cache_reads);
        self.cache_writes = self.cache_writes.saturating_add(other.cache_writes);
        self.vector_queries = self.vector_queries.saturating_add(other.vector_queries);
    }

    pub fn hit_rate(&self) -> f64 {
        let consulted = self.cache_hits + self.cache_misses;
        if consulted == 0 {
            0.0
        } else {
            self.cache_hits as f64 / consulted as f64
        }
    }
}

/// Global totals plus the per-agent breakdown.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub totals: CostTotals,
    pub agents: HashMap<String, CostTotals>,
}

/// The ledger itself.
pub struct CostLedger {
    global: Counters,
    agents: DashMap<AgentId, Arc<Counters>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self {
            global: Counters::default(),
            agents: DashMap::new(),
        }
    }

    /// Record one successful resolution against the agent and globally.
    pub fn record(&self, agent: &AgentId, metadata: &ResolutionMetadata) {
        self.global.apply(metadata);
        self.agent_counters(agent).apply(metadata);
    }

    /// Record a failed resolution attempt.
    pub fn record_failure(&self, agent: &AgentId) {
        self.global.apply_failure();
        self.agent_counters(agent).apply_failure();
    }

    pub fn snapshot(&self) -> CostSummary {
        let agents = self
            .agents
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().snapshot()))
            .collect();
        CostSummary {
            totals: self.global.snapshot(),
            agents,
        }
    }

    pub fn agent_totals(&self, agent: &AgentId) -> Option<CostTotals> {
        self.agents.get(agent).map(|entry| entry.value().snapshot())
    }

    pub fn global_totals(&self) -> CostTotals {
        self.global.snapshot()
    }

    /// Zero everything. Called from engine teardown only; counters are
    /// monotonic for the engine's whole lifetime otherwise.
    pub fn reset(&self) {
        debug!("Cost ledger reset");
        self.agents.clear();
        let counters = [
            &self.global.resolutions,
            &self.global.cache_hits,
            &self.global.cache_misses,
            &self.global.failures,
            &self.global.tokens_saved,
            &self.global.compute_units,
            &self.global.time_saved_ms,
            &self.global.cache_reads,
            &self.global.cache_writes,
            &self.global.vector_queries,
        ];
        for counter in counters {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn agent_counters(&self, agent: &AgentId) -> Arc<Counters> {
        let agent = if agent.as_str().is_empty() {
            AgentId::new(UNATTRIBUTED_AGENT)
        } else {
            agent.clone()
        };
        self.agents
            .entry(agent)
            .or_insert_with(|| Arc::new(Counters::default()))
            .clone()
    }
}

impl Default for CostLedger {
    fn default() -> Self {
        Self::new()
    }
}
