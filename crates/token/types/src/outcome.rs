//! Resolution outcomes, per-token metadata, and validation reports

use crate::cache::CachePolicy;
use crate::cost::CostImpact;
use crate::id::{AgentId, ResolverId, TokenId};
use crate::pattern::TokenType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Resolver Outcome ─────────────────────────────────────────────────

/// What a resolver hands back on success.
///
/// `cache_ttl_secs` is authoritative when present: it overrides the
/// token's tier default (0 means do-not-cache).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolverOutcome {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
    /// Set when the resolver fell back to its deterministic secondary
    /// path (e.g. exact-match lookup after a failed vector search)
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default)]
    pub cost: CostImpact,
}

impl ResolverOutcome {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            cache_ttl_secs: None,
            fallback_used: false,
            cost: CostImpact::default(),
        }
    }

    pub fn with_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = Some(secs);
        self
    }

    pub fn with_fallback(mut self) -> Self {
        self.fallback_used = true;
        self
    }

    pub fn with_cost(mut self, cost: CostImpact) -> Self {
        self.cost = cost;
        self
    }
}

// ── Resolution Metadata ──────────────────────────────────────────────

/// How a value came to be: timing, cache behavior, degradation flags
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionMetadata {
    pub resolve_time_ms: u64,
    pub cache_hit: bool,
    /// Deterministic fallback or fallback resolver produced the value
    pub fallback_used: bool,
    /// Policy substituted a default value after resolver failure
    pub degraded: bool,
    /// An expired cache entry was served
    pub stale: bool,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<ResolverId>,
    /// Tier the cache interaction ran under; `None` when the cache was
    /// never consulted (`NoCache` tokens)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_tier: Option<CachePolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub cost: CostImpact,
}

/// One resolved token inside a template result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenResolution {
    pub token_id: TokenId,
    pub placeholder: String,
    pub value: Value,
    pub metadata: ResolutionMetadata,
}

// ── Batch Status ─────────────────────────────────────────────────────

/// Summary status of a template or batch resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every placeholder resolved
    Success,
    /// Some resolved, some failed
    Partial,
    /// Nothing resolved
    Failure,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BatchStatus::Success => "success",
            BatchStatus::Partial => "partial",
            BatchStatus::Failure => "failure",
        };
        write!(f, "{}", name)
    }
}

// ── Validation ───────────────────────────────────────────────────────

/// Result of structural and boundary validation, run before any
/// resolver body executes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    pub fn failed(issue: ValidationIssue) -> Self {
        Self {
            valid: false,
            issues: vec![issue],
        }
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.valid = false;
        self.issues.push(issue);
    }

    /// Issues joined for error messages and logs
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(|issue| issue.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationIssue {
    /// Placeholder shape does not match the type's pattern
    StructuralMismatch { detail: String },
    /// A required segment is empty
    EmptySegment { segment: String },
    /// Resolver type and token type disagree
    TypeBoundary {
        expected: TokenType,
        actual: TokenType,
    },
    /// Requesting agent is not on the token's resolve allowlist
    PermissionDenied { agent: AgentId },
    /// Token namespace is outside the permitted set
    NamespaceDenied { namespace: String },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::StructuralMismatch { detail } => {
                write!(f, "structural mismatch: {}", detail)
            }
            ValidationIssue::EmptySegment { segment } => {
                write!(f, "empty segment '{}'", segment)
            }
            ValidationIssue::TypeBoundary { expected, actual } => {
                write!(f, "type boundary: {} resolver, {} token", expected, actual)
            }
            ValidationIssue::PermissionDenied { agent } => {
                write!(f, "agent '{}' not permitted", agent)
            }
            ValidationIssue::NamespaceDenied { namespace } => {
                write!(f, "namespace '{}' not permitted", namespace)
            }
        }
    }
}
