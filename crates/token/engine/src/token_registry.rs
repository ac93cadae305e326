//! Live token registry.
//!
//! Tokens are interned by their logical coordinates: two placeholders
//! with the same type, namespace, scope, and identifier share one
//! registry entry, so usage statistics and dependency edges accumulate
//! in one place. Terminal tokens (expired, invalidated) linger until a
//! sweep reclaims them, which keeps them observable for debugging and
//! stale-grace windows.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use token_types::{ResolutionMetadata, Token, TokenId};

fn logical_key(token: &Token) -> String {
    token.cache_key().to_string()
}

pub struct TokenRegistry {
    tokens: DashMap<TokenId, Token>,
    by_key: DashMap<String, TokenId>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
            by_key: DashMap::new(),
        }
    }

    /// Reuse the live token at these coordinates or admit `candidate`.
    ///
    /// When an active token already exists, the candidate's declared
    /// dependencies are merged into it and the existing token returned.
    /// A terminal token at the same coordinates is displaced.
    pub fn intern(&self, candidate: Token) -> Token {
        let key = logical_key(&candidate);
        let existing_id = self.by_key.get(&key).map(|entry| entry.value().clone());
        if let Some(existing_id) = existing_id {
            if let Some(mut existing) = self.tokens.get_mut(&existing_id) {
                if existing.lifecycle.is_active() {
                    for dep in candidate.dependencies {
                        if !existing.dependencies.contains(&dep) {
                            existing.dependencies.push(dep);
                        }
                    }
                    return existing.clone();
                }
            }
        }
        debug!(token = %candidate.placeholder, id = %candidate.id, "Interned token");
        self.by_key.insert(key, candidate.id.clone());
        self.tokens.insert(candidate.id.clone(), candidate.clone());
        candidate
    }

    pub fn get(&self, id: &TokenId) -> Option<Token> {
        self.tokens.get(id).map(|entry| entry.clone())
    }

    /// The live token at a candidate's coordinates, if any.
    pub fn get_by_coordinates(&self, candidate: &Token) -> Option<Token> {
        let id = self.by_key.get(&logical_key(candidate))?.clone();
        self.get(&id)
    }

    /// Rewrite dependency edges that still point at ids displaced
    /// during interning. Edges keep their order; a rewrite landing on
    /// an id the token already depends on collapses into it.
    pub fn remap_dependencies(&self, rewrites: &HashMap<TokenId, TokenId>) {
        if rewrites.is_empty() {
            return;
        }
        for mut entry in self.tokens.iter_mut() {
            if !entry.dependencies.iter().any(|dep| rewrites.contains_key(dep)) {
                continue;
            }
            for dep in entry.dependencies.iter_mut() {
                if let Some(surviving) = rewrites.get(dep) {
                    *dep = surviving.clone();
                }
            }
            let mut seen = HashSet::new();
            entry.dependencies.retain(|dep| seen.insert(dep.clone()));
        }
    }

    /// Apply a successful resolution. Returns whether this changed an
    /// already-resolved value, which is what triggers dependent
    /// invalidation.
    pub fn apply_resolution(
        &self,
        id: &TokenId,
        value: &Value,
        metadata: &ResolutionMetadata,
    ) -> bool {
        let mut token = match self.tokens.get_mut(id) {
            Some(token) => token,
            None => return false,
        };
        let value_changed = token
            .value
            .as_ref()
            .map(|previous| previous != value)
            .unwrap_or(false);
        let now = Utc::now();
        if metadata.cache_hit {
            token.usage.record_hit(now);
        } else {
            token.usage.record_miss(metadata.resolve_time_ms, now);
        }
        token.usage.cost.merge(&metadata.cost);
        token.mark_resolved(value.clone());
        value_changed
    }

    /// Record a failed resolution attempt against the token.
    pub fn apply_failure(&self, id: &TokenId) {
        if let Some(mut token) = self.tokens.get_mut(id) {
            token.usage.record_failure();
        }
    }

    /// Invalidate every active token that directly depends on `id`.
    /// Returns the invalidated ids.
    pub fn invalidate_dependents(&self, id: &TokenId) -> Vec<TokenId> {
        let mut invalidated = Vec::new();
        for mut entry in self.tokens.iter_mut() {
            if entry.id != *id
                && entry.lifecycle.is_active()
                && entry.dependencies.contains(id)
            {
                entry.invalidate();
                invalidated.push(entry.id.clone());
            }
        }
        if !invalidated.is_empty() {
            debug!(source = %id, count = invalidated.len(), "Invalidated dependent tokens");
        }
        invalidated
    }

    /// Push past-expiry tokens into `Expired`, then reclaim terminal
    /// tokens whose grace window has lapsed. Returns how many were
    /// reclaimed.
    pub fn sweep(&self, grace: Duration) -> usize {
        let now = Utc::now();
        for mut entry in self.tokens.iter_mut() {
            if entry.lifecycle.is_active() && entry.is_expired(now) {
                entry.mark_expired();
            }
        }

        let mut reclaimed = Vec::new();
        self.tokens.retain(|id, token| {
            let done = token.lifecycle.is_terminal() && now - token.updated_at >= grace;
            if done {
                reclaimed.push((id.clone(), logical_key(token)));
            }
            !done
        });
        for (id, key) in &reclaimed {
            // unmap only if the key still points at the reclaimed token
            self.by_key.remove_if(key, |_, mapped| mapped == id);
        }
        if !reclaimed.is_empty() {
            debug!(count = reclaimed.len(), "Swept terminal tokens");
        }
        reclaimed.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|entry| entry.lifecycle.is_active())
            .count()
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}
