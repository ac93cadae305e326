//! Injected collaborators the resolvers read from.
//!
//! The engine never opens connections of its own. Everything a resolver
//! touches (the vector index, the shared key-value cache, the four
//! backing stores) arrives as a trait object inside [`StoreHandles`],
//! so tests and embedders swap implementations freely.

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use token_types::TokenResult;

pub use memory::{
    InMemoryContextStore, InMemoryDataStore, InMemoryKeyValue, InMemoryMetricsStore,
    InMemoryStateStore, InMemoryStores, InMemoryVectorIndex,
};

// ── Vector search ───────────────────────────────────────────────────────────

/// One ranked hit from a similarity search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Stable id of the stored document
    pub id: String,
    /// Similarity score, higher is closer
    pub score: f64,
    /// The stored document itself
    pub payload: Value,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, score: f64, payload: Value) -> Self {
        Self {
            id: id.into(),
            score,
            payload,
        }
    }
}

/// Ranked similarity search over named collections.
#[async_trait]
pub trait VectorSearchClient: Send + Sync {
    /// Search `collection` for documents matching every `filter` pair,
    /// returning at most `limit` hits ordered best-first.
    async fn search(
        &self,
        collection: &str,
        filter: &HashMap<String, String>,
        limit: usize,
    ) -> TokenResult<Vec<SearchHit>>;
}

// ── Shared key-value cache ──────────────────────────────────────────────────

/// The shared cache backend behind the local tier.
///
/// Errors from this trait are degraded to cache misses by the caller,
/// never surfaced as resolution failures.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> TokenResult<Option<Value>>;
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> TokenResult<()>;
    /// Drop `key` immediately.
    async fn expire(&self, key: &str) -> TokenResult<()>;
}

// ── Backing stores ──────────────────────────────────────────────────────────

/// Read-only access to shared workflow context.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn fetch(&self, namespace: &str, scope: &str, identifier: &str)
        -> TokenResult<Option<Value>>;
}

/// Read-only observation of live agent and workflow state.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn observe(&self, kind: &str, subject: &str, key: &str) -> TokenResult<Option<Value>>;
}

/// Precomputed metric aggregates. Absence means the aggregate was never
/// computed; implementations must not compute on demand.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn report(&self, category: &str, timeframe: &str, metric: &str)
        -> TokenResult<Option<Value>>;
}

/// Exact-match document lookup, the deterministic fallback behind
/// vector search.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn lookup(&self, data_type: &str, version: &str, identifier: &str)
        -> TokenResult<Option<Value>>;
}

// ── Handle bundle ───────────────────────────────────────────────────────────

/// Everything a resolver may read from, bundled for injection.
#[derive(Clone)]
pub struct StoreHandles {
    pub vector: Arc<dyn VectorSearchClient>,
    pub kv: Arc<dyn KeyValueCache>,
    pub context: Arc<dyn ContextStore>,
    pub state: Arc<dyn StateStore>,
    pub metrics: Arc<dyn MetricsStore>,
    pub data: Arc<dyn DataStore>,
}

impl StoreHandles {
    /// Fully in-memory handles. Returns the concrete stores alongside so
    /// callers can seed them.
    pub fn in_memory() -> (Self, InMemoryStores) {
        let stores = InMemoryStores::new();
        (stores.handles(), stores)
    }
}
