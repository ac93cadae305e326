//! In-memory store implementations.
//!
//! The default wiring for tests and demos. Each store can be flipped
//! unavailable to exercise degradation paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use token_types::{TokenError, TokenResult};

use super::{
    ContextStore, DataStore, KeyValueCache, MetricsStore, SearchHit, StateStore, StoreHandles,
    VectorSearchClient,
};

fn compound_key(a: &str, b: &str, c: &str) -> String {
    format!("{}/{}/{}", a, b, c)
}

// ── Vector index ────────────────────────────────────────────────────────────

/// Seeded vector index. Hits are filtered on exact payload fields and
/// returned best-score-first, which is enough to stand in for a real
/// similarity backend.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    collections: DashMap<String, Vec<SearchHit>>,
    unavailable: AtomicBool,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, collection: impl Into<String>, hit: SearchHit) {
        self.collections.entry(collection.into()).or_default().push(hit);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorSearchClient for InMemoryVectorIndex {
    async fn search(
        &self,
        collection: &str,
        filter: &HashMap<String, String>,
        limit: usize,
    ) -> TokenResult<Vec<SearchHit>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TokenError::Store("vector index offline".to_string()));
        }
        let mut hits: Vec<SearchHit> = match self.collections.get(collection) {
            Some(entries) => entries
                .iter()
                .filter(|hit| {
                    filter.iter().all(|(field, want)| {
                        hit.payload
                            .get(field)
                            .and_then(Value::as_str)
                            .map(|have| have == want)
                            .unwrap_or(false)
                    })
                })
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

// ── Key-value cache ─────────────────────────────────────────────────────────

struct KvEntry {
    value: Value,
    expires_at: Option<Instant>,
}

/// Key-value cache with TTL expiry on read.
#[derive(Default)]
pub struct InMemoryKeyValue {
    entries: DashMap<String, KvEntry>,
    unavailable: AtomicBool,
}

impl InMemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_available(&self, operation: &str) -> TokenResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TokenError::CacheUnavailable(format!(
                "{} refused, backend offline",
                operation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueCache for InMemoryKeyValue {
    async fn get(&self, key: &str) -> TokenResult<Option<Value>> {
        self.ensure_available("get")?;
        let expired = match self.entries.get(key) {
            Some(entry) => match entry.expires_at {
                Some(at) => Instant::now() >= at,
                None => false,
            },
            None => return Ok(None),
        };
        if expired {
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> TokenResult<()> {
        self.ensure_available("set")?;
        self.entries.insert(
            key.to_string(),
            KvEntry {
                value: value.clone(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str) -> TokenResult<()> {
        self.ensure_available("expire")?;
        self.entries.remove(key);
        Ok(())
    }
}

// ── Backing stores ──────────────────────────────────────────────────────────

/// Seeded context entries keyed by namespace, scope, and identifier.
#[derive(Default)]
pub struct InMemoryContextStore {
    entries: DashMap<String, Value>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, namespace: &str, scope: &str, identifier: &str, value: Value) {
        self.entries.insert(compound_key(namespace, scope, identifier), value);
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn fetch(
        &self,
        namespace: &str,
        scope: &str,
        identifier: &str,
    ) -> TokenResult<Option<Value>> {
        Ok(self
            .entries
            .get(&compound_key(namespace, scope, identifier))
            .map(|entry| entry.clone()))
    }
}

/// Seeded state observations.
#[derive(Default)]
pub struct InMemoryStateStore {
    entries: DashMap<String, Value>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, kind: &str, subject: &str, key: &str, value: Value) {
        self.entries.insert(compound_key(kind, subject, key), value);
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn observe(&self, kind: &str, subject: &str, key: &str) -> TokenResult<Option<Value>> {
        Ok(self
            .entries
            .get(&compound_key(kind, subject, key))
            .map(|entry| entry.clone()))
    }
}

/// Seeded metric aggregates. Nothing is ever computed here, matching
/// the contract that metrics are precomputed or absent.
#[derive(Default)]
pub struct InMemoryMetricsStore {
    entries: DashMap<String, Value>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, category: &str, timeframe: &str, metric: &str, value: Value) {
        self.entries.insert(compound_key(category, timeframe, metric), value);
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn report(
        &self,
        category: &str,
        timeframe: &str,
        metric: &str,
    ) -> TokenResult<Option<Value>> {
        Ok(self
            .entries
            .get(&compound_key(category, timeframe, metric))
            .map(|entry| entry.clone()))
    }
}

/// Seeded exact-match documents.
#[derive(Default)]
pub struct InMemoryDataStore {
    entries: DashMap<String, Value>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, data_type: &str, version: &str, identifier: &str, value: Value) {
        self.entries.insert(compound_key(data_type, version, identifier), value);
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn lookup(
        &self,
        data_type: &str,
        version: &str,
        identifier: &str,
    ) -> TokenResult<Option<Value>> {
        Ok(self
            .entries
            .get(&compound_key(data_type, version, identifier))
            .map(|entry| entry.clone()))
    }
}

// ── Bundle ──────────────────────────────────────────────────────────────────

/// The full in-memory store set, kept as concrete types so tests can
/// seed and toggle them after handing [`StoreHandles`] to the engine.
#[derive(Clone)]
pub struct InMemoryStores {
    pub vector: Arc<InMemoryVectorIndex>,
    pub kv: Arc<InMemoryKeyValue>,
    pub context: Arc<InMemoryContextStore>,
    pub state: Arc<InMemoryStateStore>,
    pub metrics: Arc<InMemoryMetricsStore>,
    pub data: Arc<InMemoryDataStore>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self {
            vector: Arc::new(InMemoryVectorIndex::new()),
            kv: Arc::new(InMemoryKeyValue::new()),
            context: Arc::new(InMemoryContextStore::new()),
            state: Arc::new(InMemoryStateStore::new()),
            metrics: Arc::new(InMemoryMetricsStore::new()),
            data: Arc::new(InMemoryDataStore::new()),
        }
    }

    /// Trait-object view for injection into the engine.
    pub fn handles(&self) -> StoreHandles {
        StoreHandles {
            vector: self.vector.clone(),
            kv: self.kv.clone(),
            context: self.context.clone(),
            state: self.state.clone(),
            metrics: self.metrics.clone(),
            data: self.data.clone(),
        }
    }
}

impl Default for InMemoryStores {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_vector_search_filters_and_ranks() {
        let index = InMemoryVectorIndex::new();
        index.seed(
            "knowledge",
            SearchHit::new("a", 0.42, json!({"identifier": "rust", "version": "v1", "body": "old"})),
        );
        index.seed(
            "knowledge",
            SearchHit::new("b", 0.91, json!({"identifier": "rust", "version": "v1", "body": "new"})),
        );
        index.seed(
            "knowledge",
            SearchHit::new("c", 0.99, json!({"identifier": "go", "version": "v1"})),
        );

        let mut filter = HashMap::new();
        filter.insert("identifier".to_string(), "rust".to_string());
        filter.insert("version".to_string(), "v1".to_string());
        let hits = index.search("knowledge", &filter, 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_vector_search_unavailable() {
        let index = InMemoryVectorIndex::new();
        index.set_unavailable(true);
        let err = index.search("knowledge", &HashMap::new(), 5).await.unwrap_err();
        assert!(err.to_string().contains("offline"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kv_ttl_expiry() {
        let kv = InMemoryKeyValue::new();
        kv.set("k", &json!(1), Some(Duration::from_secs(30))).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some(json!(1)));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_kv_unavailable_errors() {
        let kv = InMemoryKeyValue::new();
        kv.set("k", &json!(1), None).await.unwrap();
        kv.set_unavailable(true);
        assert!(kv.get("k").await.is_err());
        assert!(kv.set("k", &json!(2), None).await.is_err());
    }

    #[tokio::test]
    async fn test_seeded_stores_round_trip() {
        let stores = InMemoryStores::new();
        stores.context.seed("workflow", "current", "phase", json!("review"));
        stores.state.seed("agent", "orch-1", "status", json!("busy"));
        stores.metrics.seed("latency", "1h", "p99", json!(250));
        stores.data.seed("docs", "v2", "readme", json!({"body": "hello"}));

        let handles = stores.handles();
        assert_eq!(
            handles.context.fetch("workflow", "current", "phase").await.unwrap(),
            Some(json!("review"))
        );
        assert_eq!(
            handles.state.observe("agent", "orch-1", "status").await.unwrap(),
            Some(json!("busy"))
        );
        assert_eq!(
            handles.metrics.report("latency", "1h", "p99").await.unwrap(),
            Some(json!(250))
        );
        assert_eq!(
            handles.data.lookup("docs", "v2", "readme").await.unwrap(),
            Some(json!({"body": "hello"}))
        );
        assert_eq!(handles.metrics.report("latency", "7d", "p99").await.unwrap(), None);
    }
}
