//! Tiered token cache.
//!
//! A local concurrent map fronts an optional shared key-value backend.
//! Entries are keyed by logical coordinates ([`CacheKey`]), never by
//! token instance id. Expired entries stay in the local map so failure
//! policies can serve them stale; a periodic purge reclaims them once
//! the stale grace lapses.
//!
//! Backend faults are never fatal here: a failing remote read degrades
//! to a miss, a failing remote write is dropped with a warning.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use token_types::{CacheKey, CachePolicy, ResolverId};

use crate::config::CacheConfig;
use crate::stores::KeyValueCache;

/// Result of a cache lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheDecision {
    /// A fresh entry
    Hit { value: Value, age: Duration },
    /// Nothing usable; resolve and store
    Miss,
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
    /// Resolver that produced the value, when known
    source: Option<ResolverId>,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.stored_at)
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < self.ttl
    }
}

/// The cache layer. Writes to one key are atomic; concurrent stores
/// interleave per key with last-complete-write-wins.
pub struct TokenCache {
    local: DashMap<CacheKey, CacheEntry>,
    remote: Option<Arc<dyn KeyValueCache>>,
    remote_enabled: bool,
    stale_grace: Duration,
}

impl TokenCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            local: DashMap::new(),
            remote: None,
            remote_enabled: config.remote_enabled,
            stale_grace: Duration::from_secs(config.stale_grace_secs),
        }
    }

    /// Attach the shared backend. Without one the cache is local-only.
    pub fn with_remote(mut self, remote: Arc<dyn KeyValueCache>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Fresh-entry lookup. `refresh_ttl` is the TTL applied when a
    /// remote hit is pulled back into the local tier.
    pub async fn lookup(&self, key: &CacheKey, refresh_ttl: Option<Duration>) -> CacheDecision {
        let now = Instant::now();
        if let Some(entry) = self.local.get(key) {
            if entry.is_fresh(now) {
                debug!(key = %key, source = ?entry.source, "Local cache hit");
                return CacheDecision::Hit {
                    value: entry.value.clone(),
                    age: entry.age(now),
                };
            }
            // expired locally; the remote may still hold a fresher copy
        }

        if self.remote_enabled {
            if let Some(remote) = &self.remote {
                match remote.get(&Self::remote_key(key)).await {
                    Ok(Some(value)) => {
                        if let Some(ttl) = refresh_ttl {
                            self.insert_local(key, &value, ttl, None);
                        }
                        debug!(key = %key, "Remote cache hit");
                        return CacheDecision::Hit {
                            value,
                            age: Duration::ZERO,
                        };
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(key = %key, error = %err, "Cache backend unavailable, treating as miss");
                    }
                }
            }
        }
        CacheDecision::Miss
    }

    /// Any local entry, fresh or expired. Failure policies use this to
    /// serve stale values after a resolver gives up.
    pub fn lookup_stale(&self, key: &CacheKey) -> Option<(Value, Duration)> {
        let now = Instant::now();
        self.local
            .get(key)
            .map(|entry| (entry.value.clone(), entry.age(now)))
    }

    /// Store under an explicit TTL. `None` or zero means do-not-cache;
    /// anything above the tier ceiling is clamped. Returns whether the
    /// value was stored.
    pub async fn store(
        &self,
        key: &CacheKey,
        value: &Value,
        ttl: Option<Duration>,
        source: Option<ResolverId>,
    ) -> bool {
        let ttl = match ttl {
            Some(t) if !t.is_zero() => t.min(Duration::from_secs(CachePolicy::MAX_TTL_SECS)),
            _ => return false,
        };
        self.insert_local(key, value, ttl, source);
        if self.remote_enabled {
            if let Some(remote) = &self.remote {
                if let Err(err) = remote.set(&Self::remote_key(key), value, Some(ttl)).await {
                    warn!(key = %key, error = %err, "Cache backend write dropped");
                }
            }
        }
        true
    }

    /// Drop the entry everywhere.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.local.remove(key);
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.expire(&Self::remote_key(key)).await {
                warn!(key = %key, error = %err, "Cache backend expire dropped");
            }
        }
    }

    /// Reclaim local entries expired beyond the stale grace window.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.local.len();
        self.local
            .retain(|_, entry| entry.age(now) < entry.ttl + self.stale_grace);
        before - self.local.len()
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    fn insert_local(&self, key: &CacheKey, value: &Value, ttl: Duration, source: Option<ResolverId>) {
        self.local.insert(
            key.clone(),
            CacheEntry {
                value: value.clone(),
                stored_at: Instant::now(),
                ttl,
                source,
            },
        );
    }

    fn remote_key(key: &CacheKey) -> String {
        format!("tok:{}", key)
    }
}
