//! Cache tiers and the logical cache identity of a token
//!
//! Cached values are keyed by what a token *refers to*, not by which
//! token instance referred to it: two tokens with the same namespace,
//! type, scope, and identifier share one cache entry.

use crate::pattern::TokenType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Cache Policy ─────────────────────────────────────────────────────

/// The four cache tiers, ordered by TTL
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Never stored; every resolution is fresh
    NoCache,
    /// Up to 60 seconds
    ShortTerm,
    /// 60 to 300 seconds
    MediumTerm,
    /// 300 to 600 seconds
    LongTerm,
}

impl CachePolicy {
    /// Hard ceiling on any TTL, resolver-supplied or tiered
    pub const MAX_TTL_SECS: u64 = 600;

    /// Default TTL for the tier; `None` for `NoCache`
    pub fn ttl_secs(&self) -> Option<u64> {
        match self {
            CachePolicy::NoCache => None,
            CachePolicy::ShortTerm => Some(60),
            CachePolicy::MediumTerm => Some(300),
            CachePolicy::LongTerm => Some(600),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs().map(Duration::from_secs)
    }

    pub fn is_cacheable(&self) -> bool {
        !matches!(self, CachePolicy::NoCache)
    }

    /// Tier covering a concrete TTL. `0` means do-not-cache; anything
    /// above the ceiling clamps to `LongTerm`.
    pub fn for_ttl_secs(secs: u64) -> CachePolicy {
        match secs {
            0 => CachePolicy::NoCache,
            1..=60 => CachePolicy::ShortTerm,
            61..=300 => CachePolicy::MediumTerm,
            _ => CachePolicy::LongTerm,
        }
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CachePolicy::NoCache => "no_cache",
            CachePolicy::ShortTerm => "short_term",
            CachePolicy::MediumTerm => "medium_term",
            CachePolicy::LongTerm => "long_term",
        };
        write!(f, "{}", name)
    }
}

// ── Cache Key ────────────────────────────────────────────────────────

/// Logical identity of a cached value.
///
/// Derived from token coordinates, never from `TokenId`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub namespace: String,
    pub token_type: TokenType,
    pub scope: String,
    pub identifier: String,
}

impl CacheKey {
    pub fn new(
        namespace: impl Into<String>,
        token_type: TokenType,
        scope: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            token_type,
            scope: scope.into(),
            identifier: identifier.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.token_type, self.namespace, self.scope, self.identifier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ttls_are_ordered() {
        assert_eq!(CachePolicy::NoCache.ttl_secs(), None);
        assert_eq!(CachePolicy::ShortTerm.ttl_secs(), Some(60));
        assert_eq!(CachePolicy::MediumTerm.ttl_secs(), Some(300));
        assert_eq!(CachePolicy::LongTerm.ttl_secs(), Some(600));
    }

    #[test]
    fn test_for_ttl_secs_boundaries() {
        assert_eq!(CachePolicy::for_ttl_secs(0), CachePolicy::NoCache);
        assert_eq!(CachePolicy::for_ttl_secs(1), CachePolicy::ShortTerm);
        assert_eq!(CachePolicy::for_ttl_secs(60), CachePolicy::ShortTerm);
        assert_eq!(CachePolicy::for_ttl_secs(61), CachePolicy::MediumTerm);
        assert_eq!(CachePolicy::for_ttl_secs(300), CachePolicy::MediumTerm);
        assert_eq!(CachePolicy::for_ttl_secs(301), CachePolicy::LongTerm);
        assert_eq!(CachePolicy::for_ttl_secs(10_000), CachePolicy::LongTerm);
    }

    #[test]
    fn test_cache_key_ignores_token_identity() {
        let a = CacheKey::new("workflow", TokenType::Context, "current", "agent-roles");
        let b = CacheKey::new("workflow", TokenType::Context, "current", "agent-roles");
        assert_eq!(a, b);

        let c = CacheKey::new("workflow", TokenType::State, "current", "agent-roles");
        assert_ne!(a, c);
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::new("embeddings", TokenType::Data, "v2", "user-profile");
        assert_eq!(key.to_string(), "data:embeddings:v2:user-profile");
    }
}
