//! The resolution engine facade.
//!
//! `resolve_template` is the main entry point: scan the text, intern
//! one token per distinct placeholder, arrange the batch into
//! dependency layers, resolve each layer concurrently, and splice the
//! values back into the text. Per-token failures never abort the
//! template; they are collected into the result alongside whatever did
//! resolve.
//!
//! Within a layer, tokens resolve via joined futures rather than
//! spawned tasks: dropping the future returned by `resolve_template`
//! cancels still-pending resolver calls, while completed cache and
//! ledger writes remain.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use token_parser::PlaceholderMatch;
use token_types::{
    AgentId, BatchStatus, CachePolicy, CostImpact, FailureMode, ResolutionMetadata, Token,
    TokenError, TokenId, TokenMetadata, TokenResolution, TokenResult, TokenType,
    DEPENDENCY_SENTINEL,
};

use crate::cache::{CacheDecision, TokenCache};
use crate::config::EngineConfig;
use crate::context::ResolverContext;
use crate::cost::{CostLedger, CostSummary};
use crate::dependency::DependencyTracker;
use crate::failure::{FailureEngine, PolicyOutcome};
use crate::registry::ResolverRegistry;
use crate::resolvers::{builtin_resolvers, TokenResolver};
use crate::stores::KeyValueCache;
use crate::token_registry::TokenRegistry;

// ── Results ─────────────────────────────────────────────────────────────────

/// Everything a template (or batch) resolution produced.
#[derive(Clone, Debug)]
pub struct TemplateResolution {
    /// Template text with every resolved placeholder substituted;
    /// failed placeholders remain verbatim. Empty for batch calls.
    pub resolved_text: String,
    /// Successful per-token results, in execution order
    pub resolutions: Vec<TokenResolution>,
    /// Parse issues and per-token failures
    pub errors: Vec<TokenError>,
    pub status: BatchStatus,
    /// Token ids in the order the engine processed them
    pub execution_order: Vec<TokenId>,
    pub duration_ms: u64,
}

impl TemplateResolution {
    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Success
    }

    /// The resolution for a given placeholder, if it succeeded.
    pub fn resolution_for(&self, placeholder: &str) -> Option<&TokenResolution> {
        self.resolutions.iter().find(|r| r.placeholder == placeholder)
    }
}

struct BatchOutcome {
    resolutions: Vec<TokenResolution>,
    execution_order: Vec<TokenId>,
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// The resolution engine. Cheap to share behind an `Arc`; every method
/// takes `&self`.
pub struct ResolutionEngine {
    config: EngineConfig,
    resolvers: Arc<ResolverRegistry>,
    cache: Arc<TokenCache>,
    ledger: Arc<CostLedger>,
    tokens: Arc<TokenRegistry>,
    failure: FailureEngine,
    closed: AtomicBool,
}

impl ResolutionEngine {
    /// Engine with an empty resolver registry and a local-only cache.
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, None)
    }

    /// Engine whose cache writes through to a shared backend.
    pub fn with_remote_cache(config: EngineConfig, remote: Arc<dyn KeyValueCache>) -> Self {
        Self::build(config, Some(remote))
    }

    /// Engine with the five built-in resolvers already registered.
    pub fn with_default_resolvers(config: EngineConfig) -> TokenResult<Self> {
        let engine = Self::new(config);
        engine.register_default_resolvers()?;
        Ok(engine)
    }

    fn build(config: EngineConfig, remote: Option<Arc<dyn KeyValueCache>>) -> Self {
        let resolvers = Arc::new(ResolverRegistry::new());
        let mut cache = TokenCache::new(&config.cache);
        if let Some(remote) = remote {
            cache = cache.with_remote(remote);
        }
        let cache = Arc::new(cache);
        let failure = FailureEngine::new(resolvers.clone(), cache.clone());
        info!(mode = %config.failure.mode, "Resolution engine initialized");
        Self {
            config,
            resolvers,
            cache,
            ledger: Arc::new(CostLedger::new()),
            tokens: Arc::new(TokenRegistry::new()),
            failure,
            closed: AtomicBool::new(false),
        }
    }

    // ── Wiring ──────────────────────────────────────────────────────────────

    /// Register the five built-in primaries.
    pub fn register_default_resolvers(&self) -> TokenResult<()> {
        self.ensure_open()?;
        for resolver in builtin_resolvers() {
            self.resolvers.register(resolver)?;
        }
        Ok(())
    }

    /// Register a primary resolver. Fails fast when its type is taken.
    pub fn register_resolver(&self, resolver: Arc<dyn TokenResolver>) -> TokenResult<()> {
        self.ensure_open()?;
        self.resolvers.register(resolver)
    }

    /// Register a fallback resolver for use from failure policies.
    pub fn register_fallback_resolver(&self, resolver: Arc<dyn TokenResolver>) -> TokenResult<()> {
        self.ensure_open()?;
        self.resolvers.register_fallback(resolver)
    }

    // ── Template Resolution ─────────────────────────────────────────────────

    /// Resolve every placeholder in `text`.
    ///
    /// Never errors on per-token failures; the only `Err` cases are
    /// engine-level (already shut down).
    #[instrument(skip(self, text, ctx), fields(agent = %ctx.agent_id))]
    pub async fn resolve_template(
        &self,
        text: &str,
        ctx: &ResolverContext,
    ) -> TokenResult<TemplateResolution> {
        self.ensure_open()?;
        let started = std::time::Instant::now();

        let scanned = token_parser::scan(text);
        debug!(
            matches = scanned.matches.len(),
            issues = scanned.issues.len(),
            "Scanned template"
        );

        let mut errors: Vec<TokenError> = Vec::new();
        for issue in &scanned.issues {
            warn!(placeholder = %issue.raw, reason = %issue.reason, "Skipping malformed placeholder");
            errors.push(issue.clone().into());
        }

        // one token per distinct placeholder; every occurrence keeps
        // its own span for the final splice
        let mut tokens: Vec<Token> = Vec::new();
        let mut spans: HashMap<TokenId, Vec<(usize, usize)>> = HashMap::new();
        let mut seen: HashMap<String, TokenId> = HashMap::new();
        for matched in &scanned.matches {
            if let Some(id) = seen.get(&matched.raw) {
                spans.entry(id.clone()).or_default().push(matched.span);
                continue;
            }
            let token = self.tokens.intern(self.token_from_match(matched, ctx));
            seen.insert(matched.raw.clone(), token.id.clone());
            spans.entry(token.id.clone()).or_default().push(matched.span);
            tokens.push(token);
        }

        let batch = self.resolve_layers(tokens, ctx, &mut errors).await;

        let mut substitutions: Vec<((usize, usize), String)> = Vec::new();
        for resolution in &batch.resolutions {
            if let Some(span_list) = spans.get(&resolution.token_id) {
                let rendered = render_value(&resolution.value);
                for span in span_list {
                    substitutions.push((*span, rendered.clone()));
                }
            }
        }
        let resolved_text = token_parser::splice(text, &substitutions);

        let status = batch_status(&batch.resolutions, &errors);
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            status = %status,
            resolved = batch.resolutions.len(),
            errors = errors.len(),
            duration_ms,
            "Template resolution finished"
        );
        Ok(TemplateResolution {
            resolved_text,
            resolutions: batch.resolutions,
            errors,
            status,
            execution_order: batch.execution_order,
            duration_ms,
        })
    }

    /// Resolve a batch of pre-built tokens without any template text.
    pub async fn resolve_batch(
        &self,
        tokens: Vec<Token>,
        ctx: &ResolverContext,
    ) -> TokenResult<TemplateResolution> {
        self.ensure_open()?;
        let started = std::time::Instant::now();

        let mut interned = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut rewrites: HashMap<TokenId, TokenId> = HashMap::new();
        for token in tokens {
            let submitted = token.id.clone();
            let token = self.tokens.intern(token);
            if token.id != submitted {
                rewrites.insert(submitted, token.id.clone());
            }
            if seen_ids.insert(token.id.clone()) {
                interned.push(token);
            }
        }
        // other submitted tokens may declare dependencies on a displaced
        // candidate's id; those edges follow the surviving token
        if !rewrites.is_empty() {
            self.tokens.remap_dependencies(&rewrites);
            for token in &mut interned {
                if let Some(current) = self.tokens.get(&token.id) {
                    token.dependencies = current.dependencies;
                }
            }
        }

        let mut errors = Vec::new();
        let batch = self.resolve_layers(interned, ctx, &mut errors).await;
        let status = batch_status(&batch.resolutions, &errors);
        Ok(TemplateResolution {
            resolved_text: String::new(),
            resolutions: batch.resolutions,
            errors,
            status,
            execution_order: batch.execution_order,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Resolve one token.
    #[instrument(skip(self, token, ctx), fields(token = %token.placeholder, agent = %ctx.agent_id))]
    pub async fn resolve_token(
        &self,
        token: Token,
        ctx: &ResolverContext,
    ) -> TokenResult<TokenResolution> {
        self.ensure_open()?;
        let token = self.tokens.intern(token);

        let none_in_batch = HashMap::new();
        let unmet = self.unmet_dependencies(&token, &HashSet::new(), &none_in_batch);
        if !unmet.is_empty() {
            if self.config.failure.mode == FailureMode::DependencySkip {
                return Ok(self.substitute_sentinel(&token, &unmet, &none_in_batch, ctx));
            }
            let dependency = self.describe_dependency(&unmet[0], &none_in_batch);
            self.note_failure(&token.id, &ctx.agent_id);
            return Err(TokenError::UnresolvedDependency {
                token: token.placeholder.clone(),
                dependency,
            });
        }
        self.resolve_one(&token, ctx).await
    }

    /// Parse and resolve a single raw placeholder string.
    pub async fn resolve_placeholder(
        &self,
        raw: &str,
        ctx: &ResolverContext,
    ) -> TokenResult<TokenResolution> {
        let matched = token_parser::match_placeholder(raw).map_err(TokenError::from)?;
        self.resolve_token(self.token_from_match(&matched, ctx), ctx).await
    }

    // ── Layered execution ───────────────────────────────────────────────────

    async fn resolve_layers(
        &self,
        tokens: Vec<Token>,
        ctx: &ResolverContext,
        errors: &mut Vec<TokenError>,
    ) -> BatchOutcome {
        let plan = DependencyTracker::plan(&tokens);
        let by_id: HashMap<TokenId, Token> =
            tokens.iter().map(|t| (t.id.clone(), t.clone())).collect();

        // each cycle component fails as a unit; everything else proceeds
        let mut failed: HashSet<TokenId> = HashSet::new();
        for component in &plan.cycles {
            let members: Vec<String> = component
                .iter()
                .filter_map(|id| by_id.get(id).map(|t| t.placeholder.clone()))
                .collect();
            warn!(members = ?members, "Dependency cycle; failing its members");
            errors.push(TokenError::DependencyCycle { members });
            for id in component {
                failed.insert(id.clone());
                self.note_failure(id, &ctx.agent_id);
            }
        }

        let mut resolutions = Vec::new();
        let mut execution_order = Vec::new();
        for layer in &plan.layers {
            let mut runnable: Vec<&Token> = Vec::new();
            for id in layer {
                let token = match by_id.get(id) {
                    Some(token) => token,
                    None => continue,
                };
                let unmet = self.unmet_dependencies(token, &failed, &by_id);
                if unmet.is_empty() {
                    runnable.push(token);
                } else if self.config.failure.mode == FailureMode::DependencySkip {
                    execution_order.push(token.id.clone());
                    resolutions.push(self.substitute_sentinel(token, &unmet, &by_id, ctx));
                } else {
                    let dependency = self.describe_dependency(&unmet[0], &by_id);
                    errors.push(TokenError::UnresolvedDependency {
                        token: token.placeholder.clone(),
                        dependency,
                    });
                    failed.insert(token.id.clone());
                    self.note_failure(&token.id, &ctx.agent_id);
                }
            }

            // the whole layer runs concurrently
            let futures: Vec<_> = runnable
                .iter()
                .map(|token| self.resolve_one(token, ctx))
                .collect();
            let results = join_all(futures).await;
            for (token, result) in runnable.iter().zip(results) {
                execution_order.push(token.id.clone());
                match result {
                    Ok(resolution) => resolutions.push(resolution),
                    Err(err) => {
                        failed.insert(token.id.clone());
                        errors.push(err);
                    }
                }
            }
        }

        BatchOutcome {
            resolutions,
            execution_order,
        }
    }

    /// One token, end to end: permissions, validation, cache, policy
    /// execution, bookkeeping.
    async fn resolve_one(
        &self,
        token: &Token,
        ctx: &ResolverContext,
    ) -> TokenResult<TokenResolution> {
        let started = std::time::Instant::now();

        if !token.permissions.can_resolve(&ctx.agent_id)
            || !token.permissions.allows_namespace(&token.namespace)
        {
            warn!(token = %token.placeholder, agent = %ctx.agent_id, "Permission denied");
            self.note_failure(&token.id, &ctx.agent_id);
            return Err(TokenError::PermissionDenied {
                token: token.placeholder.clone(),
                agent: ctx.agent_id.clone(),
            });
        }

        // validation runs before every resolution, cached or not
        let report = match self.resolvers.validate(token) {
            Ok(report) => report,
            Err(err) => {
                self.note_failure(&token.id, &ctx.agent_id);
                return Err(err);
            }
        };
        if !report.valid {
            warn!(token = %token.placeholder, issues = %report.summary(), "Validation failed");
            self.note_failure(&token.id, &ctx.agent_id);
            return Err(TokenError::ValidationFailed {
                token: token.placeholder.clone(),
                detail: report.summary(),
            });
        }

        let tier = self.effective_tier(token);
        let key = token.cache_key();
        if tier.is_cacheable() {
            if let CacheDecision::Hit { value, .. } = self.cache.lookup(&key, tier.ttl()).await {
                let metadata = ResolutionMetadata {
                    resolve_time_ms: started.elapsed().as_millis() as u64,
                    cache_hit: true,
                    cache_tier: Some(tier),
                    cost: CostImpact {
                        tokens_saved: CostImpact::estimate_tokens(&value),
                        time_saved_ms: token.usage.last_resolve_ms.unwrap_or(0),
                        cache_reads: 1,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                debug!(token = %token.placeholder, tier = %tier, "Cache hit");
                self.tokens.apply_resolution(&token.id, &value, &metadata);
                self.ledger.record(&ctx.agent_id, &metadata);
                return Ok(TokenResolution {
                    token_id: token.id.clone(),
                    placeholder: token.placeholder.clone(),
                    value,
                    metadata,
                });
            }
        }

        match self.failure.execute(&self.config.failure, token, ctx).await {
            Ok(policy_outcome) => {
                let PolicyOutcome {
                    outcome,
                    resolver,
                    retries,
                    degraded,
                    stale,
                    fallback_resolver_used,
                    warnings,
                } = policy_outcome;
                let ttl_override = outcome.cache_ttl_secs;
                let deterministic_fallback = outcome.fallback_used;
                let mut cost = outcome.cost;
                let value = outcome.value;
                if tier.is_cacheable() {
                    cost.cache_reads += 1;
                }

                // the resolver's TTL is authoritative when present;
                // degraded and stale values never enter the cache
                let ttl = self.effective_ttl(token, tier, ttl_override);
                let mut stored_ttl = None;
                if !degraded && !stale {
                    if self.cache.store(&key, &value, ttl, resolver.clone()).await {
                        cost.cache_writes += 1;
                        stored_ttl = ttl;
                    }
                }
                let cache_tier = if tier.is_cacheable() {
                    Some(match stored_ttl {
                        Some(ttl) => CachePolicy::for_ttl_secs(ttl.as_secs()),
                        None => tier,
                    })
                } else {
                    None
                };

                let metadata = ResolutionMetadata {
                    resolve_time_ms: started.elapsed().as_millis() as u64,
                    cache_hit: false,
                    fallback_used: deterministic_fallback || fallback_resolver_used || stale,
                    degraded,
                    stale,
                    retries,
                    resolver,
                    cache_tier,
                    warnings,
                    cost,
                };

                let value_changed = self.tokens.apply_resolution(&token.id, &value, &metadata);
                if value_changed && !degraded && !stale {
                    self.invalidate_dependents(&token.id).await;
                }
                self.ledger.record(&ctx.agent_id, &metadata);
                debug!(
                    token = %token.placeholder,
                    elapsed_ms = metadata.resolve_time_ms,
                    retries = metadata.retries,
                    "Resolved"
                );
                Ok(TokenResolution {
                    token_id: token.id.clone(),
                    placeholder: token.placeholder.clone(),
                    value,
                    metadata,
                })
            }
            Err(err) => {
                warn!(token = %token.placeholder, error = %err, "Resolution failed");
                self.note_failure(&token.id, &ctx.agent_id);
                Err(err)
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    fn effective_tier(&self, token: &Token) -> CachePolicy {
        // TEMPORAL values are never cacheable, whatever the token says
        if token.token_type() == TokenType::Temporal {
            CachePolicy::NoCache
        } else {
            token.cache_policy
        }
    }

    fn effective_ttl(
        &self,
        token: &Token,
        tier: CachePolicy,
        ttl_override: Option<u64>,
    ) -> Option<Duration> {
        if token.token_type() == TokenType::Temporal {
            return None;
        }
        match ttl_override {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs.min(CachePolicy::MAX_TTL_SECS))),
            None => tier.ttl(),
        }
    }

    fn unmet_dependencies(
        &self,
        token: &Token,
        failed: &HashSet<TokenId>,
        in_batch: &HashMap<TokenId, Token>,
    ) -> Vec<TokenId> {
        let mut unmet = Vec::new();
        for dep in &token.dependencies {
            if failed.contains(dep) {
                unmet.push(dep.clone());
                continue;
            }
            // in-batch dependencies sit in earlier layers by construction
            if in_batch.contains_key(dep) {
                continue;
            }
            match self.tokens.get(dep) {
                Some(live) if live.lifecycle.is_active() && live.value.is_some() => {}
                _ => unmet.push(dep.clone()),
            }
        }
        unmet
    }

    fn substitute_sentinel(
        &self,
        token: &Token,
        unmet: &[TokenId],
        in_batch: &HashMap<TokenId, Token>,
        ctx: &ResolverContext,
    ) -> TokenResolution {
        let warnings: Vec<String> = unmet
            .iter()
            .map(|dep| {
                format!(
                    "dependency '{}' unresolved; sentinel substituted",
                    self.describe_dependency(dep, in_batch)
                )
            })
            .collect();
        warn!(token = %token.placeholder, "Unresolved dependencies; substituting sentinel");
        let value = Value::String(DEPENDENCY_SENTINEL.to_string());
        let metadata = ResolutionMetadata {
            degraded: true,
            warnings,
            ..Default::default()
        };
        self.tokens.apply_resolution(&token.id, &value, &metadata);
        self.ledger.record(&ctx.agent_id, &metadata);
        TokenResolution {
            token_id: token.id.clone(),
            placeholder: token.placeholder.clone(),
            value,
            metadata,
        }
    }

    fn describe_dependency(&self, dep: &TokenId, in_batch: &HashMap<TokenId, Token>) -> String {
        if let Some(token) = in_batch.get(dep) {
            return token.placeholder.clone();
        }
        if let Some(token) = self.tokens.get(dep) {
            return token.placeholder.clone();
        }
        dep.to_string()
    }

    async fn invalidate_dependents(&self, id: &TokenId) {
        let invalidated = self.tokens.invalidate_dependents(id);
        for dependent in &invalidated {
            if let Some(token) = self.tokens.get(dependent) {
                self.cache.invalidate(&token.cache_key()).await;
            }
        }
    }

    fn token_from_match(&self, matched: &PlaceholderMatch, ctx: &ResolverContext) -> Token {
        let mut metadata = TokenMetadata::default().with_owner(ctx.agent_id.clone());
        if let Some(workflow) = &ctx.workflow_id {
            metadata = metadata.with_workflow(workflow.clone());
        }
        if let Some(step) = &ctx.step_id {
            metadata = metadata.with_step(step.clone());
        }
        if let Some(version) = &ctx.schema_version {
            metadata = metadata.with_schema_version(version.clone());
        }
        Token::new(
            matched.token_type,
            matched.namespace(),
            matched.scope(),
            matched.identifier(),
        )
        .with_metadata(metadata)
    }

    fn note_failure(&self, id: &TokenId, agent: &AgentId) {
        self.tokens.apply_failure(id);
        self.ledger.record_failure(agent);
    }

    fn ensure_open(&self) -> TokenResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TokenError::EngineClosed)
        } else {
            Ok(())
        }
    }

    // ── Observation and teardown ────────────────────────────────────────────

    pub fn cost_summary(&self) -> CostSummary {
        self.ledger.snapshot()
    }

    pub fn token(&self, id: &TokenId) -> Option<Token> {
        self.tokens.get(id)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Housekeeping pass: purge expired cache entries past their stale
    /// grace and sweep terminal tokens. Returns `(purged, swept)`.
    pub fn run_maintenance(&self) -> (usize, usize) {
        let purged = self.cache.purge_expired();
        let swept = self
            .tokens
            .sweep(chrono::Duration::seconds(self.config.registry.sweep_grace_secs as i64));
        debug!(purged, swept, "Maintenance pass");
        (purged, swept)
    }

    /// Shut the engine down: final sweep, ledger reset, all further
    /// calls refused. Idempotent; the first call returns the final
    /// cost summary, later calls see zeroed counters.
    pub async fn shutdown(&self) -> CostSummary {
        if self.closed.swap(true, Ordering::SeqCst) {
            return self.ledger.snapshot();
        }
        let summary = self.ledger.snapshot();
        let purged = self.cache.purge_expired();
        let swept = self.tokens.sweep(chrono::Duration::zero());
        info!(
            resolutions = summary.totals.resolutions,
            tokens_saved = summary.totals.tokens_saved,
            purged,
            swept,
            "Resolution engine shut down"
        );
        self.ledger.reset();
        summary
    }
}

fn batch_status(resolutions: &[TokenResolution], errors: &[TokenError]) -> BatchStatus {
    if errors.is_empty() {
        BatchStatus::Success
    } else if resolutions.is_empty() {
        BatchStatus::Failure
    } else {
        BatchStatus::Partial
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolvers::TokenResolver;
    use crate::stores::{InMemoryStores, StoreHandles};
    use async_trait::async_trait;
    use serde_json::json;
    use token_types::{ResolverId, ResolverOutcome};

    fn make_ctx() -> (ResolverContext, InMemoryStores) {
        let (handles, stores) = StoreHandles::in_memory();
        (ResolverContext::new(AgentId::new("orch-1"), handles), stores)
    }

    struct FixedTtlResolver {
        ttl_secs: u64,
    }

    #[async_trait]
    impl TokenResolver for FixedTtlResolver {
        fn id(&self) -> ResolverId {
            ResolverId::new("fixed-ttl")
        }

        fn token_type(&self) -> TokenType {
            TokenType::Context
        }

        async fn resolve(
            &self,
            _token: &Token,
            _ctx: &ResolverContext,
        ) -> TokenResult<ResolverOutcome> {
            Ok(ResolverOutcome::new(json!("pinned")).with_ttl_secs(self.ttl_secs))
        }
    }

    #[test]
    fn test_render_value_strings_bare() {
        assert_eq!(render_value(&json!("plain")), "plain");
        assert_eq!(render_value(&json!(7)), "7");
        assert_eq!(render_value(&json!(["a", "b"])), r#"["a","b"]"#);
        assert_eq!(render_value(&json!({"k": 1})), r#"{"k":1}"#);
    }

    #[test]
    fn test_batch_status_classification() {
        let resolution = TokenResolution {
            token_id: TokenId::generate(),
            placeholder: "{CONTEXT:a:b:c}".to_string(),
            value: json!(1),
            metadata: ResolutionMetadata::default(),
        };
        let err = TokenError::EngineClosed;
        assert_eq!(batch_status(&[], &[]), BatchStatus::Success);
        assert_eq!(batch_status(&[resolution.clone()], &[]), BatchStatus::Success);
        assert_eq!(
            batch_status(&[resolution], &[err.clone()]),
            BatchStatus::Partial
        );
        assert_eq!(batch_status(&[], &[err]), BatchStatus::Failure);
    }

    #[tokio::test]
    async fn test_closed_engine_refuses_calls() {
        let engine = ResolutionEngine::with_default_resolvers(EngineConfig::default()).unwrap();
        let (ctx, _stores) = make_ctx();
        engine.shutdown().await;

        let err = engine.resolve_template("x", &ctx).await.unwrap_err();
        assert!(matches!(err, TokenError::EngineClosed));
        assert!(engine.register_default_resolvers().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_idempotent_and_resets_ledger() {
        let engine = ResolutionEngine::with_default_resolvers(EngineConfig::default()).unwrap();
        let (ctx, stores) = make_ctx();
        stores.context.seed("workflow", "current", "phase", json!("review"));

        let result = engine
            .resolve_template("phase: {CONTEXT:workflow:current:phase}", &ctx)
            .await
            .unwrap();
        assert!(result.is_success());

        let summary = engine.shutdown().await;
        assert_eq!(summary.totals.resolutions, 1);

        let again = engine.shutdown().await;
        assert_eq!(again.totals.resolutions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_ttl_overrides_tier_default() {
        let engine = ResolutionEngine::new(EngineConfig::default());
        engine
            .register_resolver(Arc::new(FixedTtlResolver { ttl_secs: 45 }))
            .unwrap();
        let (ctx, _stores) = make_ctx();

        let first = engine
            .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
            .await
            .unwrap();
        assert!(!first.metadata.cache_hit);
        // 45 seconds lands in the short-term tier, not CONTEXT's default
        assert_eq!(first.metadata.cache_tier, Some(CachePolicy::ShortTerm));

        tokio::time::advance(Duration::from_secs(44)).await;
        let hit = engine
            .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
            .await
            .unwrap();
        assert!(hit.metadata.cache_hit);

        tokio::time::advance(Duration::from_secs(2)).await;
        let miss = engine
            .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
            .await
            .unwrap();
        assert!(!miss.metadata.cache_hit);
    }

    #[tokio::test]
    async fn test_zero_ttl_resolver_disables_caching() {
        let engine = ResolutionEngine::new(EngineConfig::default());
        engine
            .register_resolver(Arc::new(FixedTtlResolver { ttl_secs: 0 }))
            .unwrap();
        let (ctx, _stores) = make_ctx();

        let result = engine
            .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
            .await
            .unwrap();
        assert!(!result.metadata.cache_hit);
        assert_eq!(engine.cached_entries(), 0);
        // the cache was still consulted, so the tier is reported
        assert_eq!(result.metadata.cache_tier, Some(CachePolicy::MediumTerm));
    }

    #[tokio::test]
    async fn test_temporal_metadata_reports_no_cache_interaction() {
        let engine = ResolutionEngine::with_default_resolvers(EngineConfig::default()).unwrap();
        let (ctx, _stores) = make_ctx();

        let result = engine
            .resolve_placeholder("{TEMPORAL:now:once:stamp}", &ctx)
            .await
            .unwrap();
        assert_eq!(result.metadata.cache_tier, None);
        assert_eq!(engine.cached_entries(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_before_resolver() {
        let engine = ResolutionEngine::with_default_resolvers(EngineConfig::default()).unwrap();
        let (ctx, stores) = make_ctx();
        stores.context.seed("workflow", "current", "phase", json!("review"));

        let token = Token::new(TokenType::Context, "workflow", "current", "phase")
            .with_permissions(
                token_types::TokenPermissions::default().with_resolve(AgentId::new("someone-else")),
            );
        let err = engine.resolve_token(token, &ctx).await.unwrap_err();
        assert!(matches!(err, TokenError::PermissionDenied { .. }));
    }
}
