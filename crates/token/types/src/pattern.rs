//! The closed token type system and its placeholder patterns
//!
//! Exactly five placeholder kinds exist and their grammars are
//! disjoint: a raw placeholder maps to at most one [`TokenType`].
//! Dispatch throughout the engine is enum-driven; there is no open
//! registration of new kinds.

use crate::cache::CachePolicy;
use serde::{Deserialize, Serialize};

// ── Token Type ───────────────────────────────────────────────────────

/// Kind of a token, inferred from the leading tag of its placeholder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// `{CONTEXT:namespace:scope:identifier}`, workflow and conversation context
    Context,
    /// `{DATA:type:version:identifier}`, knowledge lookups via vector search
    Data,
    /// `{STATE:type:agent:key}`, runtime state observation
    State,
    /// `{METRICS:category:timeframe:metric}`, precomputed metrics
    Metrics,
    /// `{TEMPORAL:type:frequency:identifier}`, schedule and time values
    Temporal,
}

impl TokenType {
    pub fn all() -> [TokenType; 5] {
        [
            TokenType::Context,
            TokenType::Data,
            TokenType::State,
            TokenType::Metrics,
            TokenType::Temporal,
        ]
    }

    /// The uppercase tag as it appears in placeholder text
    pub fn tag(&self) -> &'static str {
        match self {
            TokenType::Context => "CONTEXT",
            TokenType::Data => "DATA",
            TokenType::State => "STATE",
            TokenType::Metrics => "METRICS",
            TokenType::Temporal => "TEMPORAL",
        }
    }

    /// Inverse of [`tag`](Self::tag); `None` for unknown tags
    pub fn from_tag(tag: &str) -> Option<TokenType> {
        match tag {
            "CONTEXT" => Some(TokenType::Context),
            "DATA" => Some(TokenType::Data),
            "STATE" => Some(TokenType::State),
            "METRICS" => Some(TokenType::Metrics),
            "TEMPORAL" => Some(TokenType::Temporal),
            _ => None,
        }
    }

    /// Cache tier applied when the resolver does not return a TTL.
    ///
    /// TEMPORAL is pinned to `NoCache`: time values go stale the
    /// moment they are produced.
    pub fn default_cache_policy(&self) -> CachePolicy {
        match self {
            TokenType::Context => CachePolicy::MediumTerm,
            TokenType::Data => CachePolicy::LongTerm,
            TokenType::State => CachePolicy::ShortTerm,
            TokenType::Metrics => CachePolicy::ShortTerm,
            TokenType::Temporal => CachePolicy::NoCache,
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenType::Context => "context",
            TokenType::Data => "data",
            TokenType::State => "state",
            TokenType::Metrics => "metrics",
            TokenType::Temporal => "temporal",
        };
        write!(f, "{}", name)
    }
}

// ── Token Pattern ────────────────────────────────────────────────────

/// Descriptor for one placeholder form: what the three segments after
/// the tag mean and which cache tier applies by default
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenPattern {
    pub token_type: TokenType,
    /// Names of the three colon-delimited segments after the tag
    pub segment_names: [String; 3],
    pub default_cache_policy: CachePolicy,
    pub description: String,
}

impl TokenPattern {
    pub fn of(token_type: TokenType) -> Self {
        let (segment_names, description) = match token_type {
            TokenType::Context => (
                ["namespace", "scope", "identifier"],
                "Workflow and conversation context, read-only",
            ),
            TokenType::Data => (
                ["type", "version", "identifier"],
                "Knowledge lookups, vector search with exact-match fallback",
            ),
            TokenType::State => (
                ["type", "agent", "key"],
                "Agent and workflow state, observation without mutation",
            ),
            TokenType::Metrics => (
                ["category", "timeframe", "metric"],
                "Precomputed performance metrics, never aggregated on demand",
            ),
            TokenType::Temporal => (
                ["type", "frequency", "identifier"],
                "Schedule and time values, always resolved fresh",
            ),
        };
        Self {
            token_type,
            segment_names: segment_names.map(String::from),
            default_cache_policy: token_type.default_cache_policy(),
            description: description.to_string(),
        }
    }

    /// All five built-in patterns
    pub fn all() -> Vec<TokenPattern> {
        TokenType::all().into_iter().map(TokenPattern::of).collect()
    }
}
