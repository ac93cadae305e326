//! The token model: a typed placeholder and everything known about it
//!
//! A Token is the resolvable unit of a workflow template. It carries
//! its logical coordinates (type, namespace, scope, identifier), the
//! resolved value once one exists, cache and permission settings,
//! lifecycle state, usage statistics, and declared dependencies on
//! other tokens.

use crate::cache::{CacheKey, CachePolicy};
use crate::cost::CostImpact;
use crate::id::{AgentId, StepId, TokenId, WorkflowId};
use crate::pattern::TokenType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ── Token ────────────────────────────────────────────────────────────

/// A single resolvable token parsed from template text
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    /// Unique instance identifier
    pub id: TokenId,
    /// Kind of this token; immutable after construction
    token_type: TokenType,
    /// First captured segment (the type-specific namespace)
    pub namespace: String,
    /// Second captured segment
    pub scope: String,
    /// Third captured segment
    pub identifier: String,
    /// Raw placeholder text, e.g. `{CONTEXT:workflow:current:agent-roles}`
    pub placeholder: String,
    /// Resolved value, once a resolution has succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Cache tier; starts at the type's pattern default
    pub cache_policy: CachePolicy,
    /// Access allowlists; empty lists mean unrestricted
    #[serde(default, skip_serializing_if = "TokenPermissions::is_unrestricted")]
    pub permissions: TokenPermissions,
    /// Attribution: owning agent, workflow, step, schema version
    #[serde(default)]
    pub metadata: TokenMetadata,
    /// Lifecycle state
    pub lifecycle: TokenLifecycle,
    /// Usage statistics, updated on every resolution attempt
    #[serde(default)]
    pub usage: UsageStats,
    /// Tokens whose values this token depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TokenId>,
    /// Hard expiry independent of cache TTLs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    /// Create a token from its coordinates. The placeholder text is
    /// reconstructed and the type's default cache tier applied.
    pub fn new(
        token_type: TokenType,
        namespace: impl Into<String>,
        scope: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        let namespace = namespace.into();
        let scope = scope.into();
        let identifier = identifier.into();
        let placeholder = format!(
            "{{{}:{}:{}:{}}}",
            token_type.tag(),
            namespace,
            scope,
            identifier
        );
        let now = Utc::now();
        Self {
            id: TokenId::generate(),
            token_type,
            namespace,
            scope,
            identifier,
            placeholder,
            value: None,
            cache_policy: token_type.default_cache_policy(),
            permissions: TokenPermissions::default(),
            metadata: TokenMetadata::default(),
            lifecycle: TokenLifecycle::Active,
            usage: UsageStats::default(),
            dependencies: Vec::new(),
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Logical cache identity; shared by every token with the same
    /// coordinates, unrelated to [`TokenId`]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            self.namespace.clone(),
            self.token_type,
            self.scope.clone(),
            self.identifier.clone(),
        )
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_permissions(mut self, permissions: TokenPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_metadata(mut self, metadata: TokenMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_dependency(mut self, dependency: TokenId) -> Self {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<TokenId>) -> Self {
        for dependency in dependencies {
            if !self.dependencies.contains(&dependency) {
                self.dependencies.push(dependency);
            }
        }
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Record a successful resolution
    pub fn mark_resolved(&mut self, value: Value) {
        self.value = Some(value);
        self.lifecycle = TokenLifecycle::Active;
        self.updated_at = Utc::now();
    }

    /// Hard-expire the token; it stays readable until swept
    pub fn mark_expired(&mut self) {
        self.lifecycle = TokenLifecycle::Expired;
        self.updated_at = Utc::now();
    }

    /// Invalidate the token, typically because a dependency's value
    /// changed underneath it
    pub fn invalidate(&mut self) {
        self.lifecycle = TokenLifecycle::Invalidated;
        self.updated_at = Utc::now();
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.lifecycle == TokenLifecycle::Expired
            || self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

// ── Lifecycle State ──────────────────────────────────────────────────

/// Lifecycle of a token instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenLifecycle {
    /// Live; resolvable and cacheable
    Active,
    /// Past its hard expiry; reclaimed after the grace window
    Expired,
    /// A dependency's value changed; reclaimed after the grace window
    Invalidated,
}

impl TokenLifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, TokenLifecycle::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenLifecycle::Expired | TokenLifecycle::Invalidated)
    }
}

impl std::fmt::Display for TokenLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenLifecycle::Active => "active",
            TokenLifecycle::Expired => "expired",
            TokenLifecycle::Invalidated => "invalidated",
        };
        write!(f, "{}", name)
    }
}

// ── Permissions ──────────────────────────────────────────────────────

/// Access allowlists. An empty list places no restriction on that
/// operation; a non-empty list admits exactly its members.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenPermissions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read: Vec<AgentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write: Vec<AgentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolve: Vec<AgentId>,
    /// Namespaces this token may be resolved under; empty = any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
}

impl TokenPermissions {
    pub fn is_unrestricted(&self) -> bool {
        self.read.is_empty()
            && self.write.is_empty()
            && self.resolve.is_empty()
            && self.namespaces.is_empty()
    }

    pub fn with_read(mut self, agent: AgentId) -> Self {
        self.read.push(agent);
        self
    }

    pub fn with_write(mut self, agent: AgentId) -> Self {
        self.write.push(agent);
        self
    }

    pub fn with_resolve(mut self, agent: AgentId) -> Self {
        self.resolve.push(agent);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    pub fn can_read(&self, agent: &AgentId) -> bool {
        self.read.is_empty() || self.read.contains(agent)
    }

    pub fn can_write(&self, agent: &AgentId) -> bool {
        self.write.is_empty() || self.write.contains(agent)
    }

    pub fn can_resolve(&self, agent: &AgentId) -> bool {
        self.resolve.is_empty() || self.resolve.contains(agent)
    }

    pub fn allows_namespace(&self, namespace: &str) -> bool {
        self.namespaces.is_empty() || self.namespaces.iter().any(|ns| ns == namespace)
    }
}

// ── Metadata ─────────────────────────────────────────────────────────

/// Attribution and versioning carried alongside a token
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Agent that owns this token's resolutions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepId>,
    /// Schema version of the resolved value's shape
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, String>,
}

impl TokenMetadata {
    pub fn with_owner(mut self, owner: AgentId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_workflow(mut self, workflow: WorkflowId) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn with_step(mut self, step: StepId) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

// ── Usage Statistics ─────────────────────────────────────────────────

/// Per-token usage counters; monotonic, saturating
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub resolutions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub failures: u64,
    /// Wall time of the last resolver call (cache hits excluded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_resolve_ms: Option<u64>,
    /// Summed resolver wall time, the numerator of the running average
    pub total_resolve_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_resolved_at: Option<DateTime<Utc>>,
    /// Cumulative cost attribution for this token
    #[serde(default)]
    pub cost: CostImpact,
}

impl UsageStats {
    pub fn record_hit(&mut self, at: DateTime<Utc>) {
        self.resolutions = self.resolutions.saturating_add(1);
        self.cache_hits = self.cache_hits.saturating_add(1);
        self.last_resolved_at = Some(at);
    }

    pub fn record_miss(&mut self, elapsed_ms: u64, at: DateTime<Utc>) {
        self.resolutions = self.resolutions.saturating_add(1);
        self.cache_misses = self.cache_misses.saturating_add(1);
        self.last_resolve_ms = Some(elapsed_ms);
        self.total_resolve_ms = self.total_resolve_ms.saturating_add(elapsed_ms);
        self.last_resolved_at = Some(at);
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn hit_rate(&self) -> f64 {
        if self.resolutions == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.resolutions as f64
        }
    }

    /// Mean resolver wall time; cache hits take no resolver time and
    /// do not dilute it.
    pub fn average_resolve_ms(&self) -> f64 {
        if self.cache_misses == 0 {
            0.0
        } else {
            self.total_resolve_ms as f64 / self.cache_misses as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_token() -> Token {
        Token::new(TokenType::Context, "workflow", "current", "agent-roles")
    }

    #[test]
    fn test_new_reconstructs_placeholder() {
        let token = make_token();
        assert_eq!(token.placeholder, "{CONTEXT:workflow:current:agent-roles}");
        assert_eq!(token.token_type(), TokenType::Context);
        assert_eq!(token.cache_policy, CachePolicy::MediumTerm);
        assert!(token.lifecycle.is_active());
    }

    #[test]
    fn test_cache_key_from_coordinates() {
        let token = make_token();
        let key = token.cache_key();
        assert_eq!(key.namespace, "workflow");
        assert_eq!(key.scope, "current");
        assert_eq!(key.identifier, "agent-roles");
        assert_eq!(key.token_type, TokenType::Context);

        // same coordinates, different instance, same key
        let other = make_token();
        assert_ne!(token.id, other.id);
        assert_eq!(token.cache_key(), other.cache_key());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut token = make_token();
        token.mark_resolved(json!(["orch-1"]));
        assert_eq!(token.value, Some(json!(["orch-1"])));
        assert!(token.lifecycle.is_active());

        token.invalidate();
        assert_eq!(token.lifecycle, TokenLifecycle::Invalidated);
        assert!(token.lifecycle.is_terminal());

        token.mark_resolved(json!(["orch-1", "worker-2"]));
        assert!(token.lifecycle.is_active());
    }

    #[test]
    fn test_hard_expiry() {
        let now = Utc::now();
        let token = make_token().with_expiry(now - chrono::Duration::seconds(1));
        assert!(token.is_expired(now));

        let fresh = make_token().with_expiry(now + chrono::Duration::seconds(60));
        assert!(!fresh.is_expired(now));
    }

    #[test]
    fn test_dependencies_deduplicated() {
        let dep = TokenId::new("dep-1");
        let token = make_token()
            .with_dependency(dep.clone())
            .with_dependencies(vec![dep.clone(), TokenId::new("dep-2")]);
        assert_eq!(token.dependencies.len(), 2);
    }

    #[test]
    fn test_permissions_empty_means_unrestricted() {
        let permissions = TokenPermissions::default();
        assert!(permissions.can_resolve(&AgentId::new("anyone")));
        assert!(permissions.allows_namespace("workflow"));
        assert!(permissions.is_unrestricted());
    }

    #[test]
    fn test_permissions_allowlist_admits_members_only() {
        let permissions = TokenPermissions::default()
            .with_resolve(AgentId::new("orch-1"))
            .with_namespace("workflow");
        assert!(permissions.can_resolve(&AgentId::new("orch-1")));
        assert!(!permissions.can_resolve(&AgentId::new("rogue")));
        assert!(permissions.allows_namespace("workflow"));
        assert!(!permissions.allows_namespace("secrets"));
    }

    #[test]
    fn test_usage_stats_counters() {
        let mut usage = UsageStats::default();
        let now = Utc::now();
        usage.record_miss(12, now);
        usage.record_hit(now);
        usage.record_hit(now);
        usage.record_failure();

        assert_eq!(usage.resolutions, 3);
        assert_eq!(usage.cache_hits, 2);
        assert_eq!(usage.cache_misses, 1);
        assert_eq!(usage.failures, 1);
        assert_eq!(usage.last_resolve_ms, Some(12));
        assert!((usage.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_usage_stats_average_resolve_time() {
        let mut usage = UsageStats::default();
        assert_eq!(usage.average_resolve_ms(), 0.0);

        let now = Utc::now();
        usage.record_miss(10, now);
        usage.record_miss(30, now);
        assert_eq!(usage.total_resolve_ms, 40);
        assert!((usage.average_resolve_ms() - 20.0).abs() < 1e-9);

        // hits leave the average untouched
        usage.record_hit(now);
        assert!((usage.average_resolve_ms() - 20.0).abs() < 1e-9);
        assert_eq!(usage.last_resolve_ms, Some(30));
    }

    #[test]
    fn test_serde_round_trip() {
        let token = make_token()
            .with_metadata(
                TokenMetadata::default()
                    .with_owner(AgentId::new("orch-1"))
                    .with_workflow(WorkflowId::new("wf-9"))
                    .with_schema_version("1"),
            )
            .with_dependency(TokenId::new("dep-1"));
        let rendered = serde_json::to_string(&token).unwrap();
        let back: Token = serde_json::from_str(&rendered).unwrap();
        assert_eq!(back.id, token.id);
        assert_eq!(back.token_type(), token.token_type());
        assert_eq!(back.placeholder, token.placeholder);
        assert_eq!(back.dependencies, token.dependencies);
        assert_eq!(back.metadata, token.metadata);
    }
}
