//! End-to-end template resolution scenarios.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use token_engine::stores::{InMemoryKeyValue, InMemoryStores, SearchHit, StoreHandles};
use token_engine::{EngineConfig, ResolutionEngine, ResolverContext, TokenResolver};
use token_types::{
    AgentId, BatchStatus, CachePolicy, CostImpact, FailureMode, FailurePolicy, ResolverId,
    ResolverOutcome, Token, TokenError, TokenResult, TokenType, DEPENDENCY_SENTINEL,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn seeded_ctx(agent: &str) -> (ResolverContext, InMemoryStores) {
    let (handles, stores) = StoreHandles::in_memory();
    stores
        .context
        .seed("workflow", "current", "phase", json!("execution"));
    stores.context.seed(
        "workflow",
        "current",
        "agent-roles",
        json!(["planner", "executor"]),
    );
    stores.state.seed("agent", "self", "status", json!("idle"));
    stores
        .metrics
        .seed("performance", "last-hour", "throughput", json!(128));
    stores
        .data
        .seed("embeddings", "v1", "design-doc", json!({"chunk": "exact"}));
    stores.vector.seed(
        "embeddings",
        SearchHit::new(
            "doc-1",
            0.93,
            json!({"identifier": "design-doc", "version": "v1", "chunk": "vector"}),
        ),
    );
    (ResolverContext::new(AgentId::new(agent), handles), stores)
}

fn default_engine() -> ResolutionEngine {
    ResolutionEngine::with_default_resolvers(EngineConfig::default()).unwrap()
}

// ── Trap resolvers ──────────────────────────────────────────────────────────

/// Counts invocations; proves a cache hit skipped the resolver body.
struct CountingResolver {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl TokenResolver for CountingResolver {
    fn id(&self) -> ResolverId {
        ResolverId::new("context-counting")
    }

    fn token_type(&self) -> TokenType {
        TokenType::Context
    }

    async fn resolve(&self, _token: &Token, _ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ResolverOutcome::new(json!("counted")).with_cost(CostImpact {
            compute_units: 1,
            ..Default::default()
        }))
    }
}

/// Succeeds on the first call, fails afterwards. Drives the stale path.
struct FailAfterFirst {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl TokenResolver for FailAfterFirst {
    fn id(&self) -> ResolverId {
        ResolverId::new("context-flaky")
    }

    fn token_type(&self) -> TokenType {
        TokenType::Context
    }

    async fn resolve(&self, token: &Token, _ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(ResolverOutcome::new(json!("live")).with_ttl_secs(1))
        } else {
            Err(TokenError::ResolutionFailure {
                token: token.placeholder.clone(),
                reason: "backend gone".to_string(),
            })
        }
    }
}

/// Always fails; primaries use it to force the fallback chain.
struct AlwaysFails;

#[async_trait]
impl TokenResolver for AlwaysFails {
    fn id(&self) -> ResolverId {
        ResolverId::new("context-broken")
    }

    fn token_type(&self) -> TokenType {
        TokenType::Context
    }

    async fn resolve(&self, token: &Token, _ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        Err(TokenError::ResolutionFailure {
            token: token.placeholder.clone(),
            reason: "primary down".to_string(),
        })
    }
}

/// Declares STATE but gets wired as a CONTEXT fallback; the boundary
/// gate must keep its body from ever running.
struct WrongTypeFallback {
    executed: Arc<AtomicBool>,
}

#[async_trait]
impl TokenResolver for WrongTypeFallback {
    fn id(&self) -> ResolverId {
        ResolverId::new("state-alt")
    }

    fn token_type(&self) -> TokenType {
        TokenType::State
    }

    async fn resolve(&self, _token: &Token, _ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        self.executed.store(true, Ordering::SeqCst);
        Ok(ResolverOutcome::new(json!("should never appear")))
    }
}

struct ContextFallback;

#[async_trait]
impl TokenResolver for ContextFallback {
    fn id(&self) -> ResolverId {
        ResolverId::new("context-alt")
    }

    fn token_type(&self) -> TokenType {
        TokenType::Context
    }

    async fn resolve(&self, _token: &Token, _ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        Ok(ResolverOutcome::new(json!("fallback-value")))
    }
}

/// Sleeps far past any budget.
struct NeverFinishes;

#[async_trait]
impl TokenResolver for NeverFinishes {
    fn id(&self) -> ResolverId {
        ResolverId::new("context-slow")
    }

    fn token_type(&self) -> TokenType {
        TokenType::Context
    }

    async fn resolve(&self, _token: &Token, _ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(ResolverOutcome::new(json!("too late")))
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolves_all_five_token_types_in_one_template() {
    init_tracing();
    let engine = default_engine();
    let (ctx, _stores) = seeded_ctx("orch-1");

    let template = "phase={CONTEXT:workflow:current:phase} \
                    doc={DATA:embeddings:v1:design-doc} \
                    status={STATE:agent:self:status} \
                    tps={METRICS:performance:last-hour:throughput} \
                    at={TEMPORAL:now:once:stamp}";
    let result = engine.resolve_template(template, &ctx).await.unwrap();

    assert_eq!(result.status, BatchStatus::Success);
    assert_eq!(result.resolutions.len(), 5);
    assert!(result.errors.is_empty());
    assert!(result.resolved_text.contains("phase=execution"));
    assert!(result.resolved_text.contains("\"chunk\":\"vector\""));
    assert!(result.resolved_text.contains("status=idle"));
    assert!(result.resolved_text.contains("tps=128"));
    // RFC 3339 timestamp substituted for the temporal placeholder
    assert!(result.resolved_text.contains("at=20"));
    for tag in ["{CONTEXT", "{DATA", "{STATE", "{METRICS", "{TEMPORAL"] {
        assert!(!result.resolved_text.contains(tag));
    }

    let temporal = result
        .resolution_for("{TEMPORAL:now:once:stamp}")
        .expect("temporal resolution present");
    assert_eq!(temporal.metadata.cache_tier, None);
}

#[tokio::test]
async fn second_resolve_within_ttl_skips_the_resolver() {
    init_tracing();
    let calls = Arc::new(AtomicU32::new(0));
    let engine = ResolutionEngine::new(EngineConfig::default());
    engine
        .register_resolver(Arc::new(CountingResolver {
            calls: calls.clone(),
        }))
        .unwrap();
    let (ctx, _stores) = seeded_ctx("orch-1");

    let first = engine
        .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap();
    assert!(!first.metadata.cache_hit);
    assert_eq!(first.metadata.resolver, Some(ResolverId::new("context-counting")));

    let second = engine
        .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap();
    assert!(second.metadata.cache_hit);
    assert_eq!(second.metadata.cache_tier, Some(CachePolicy::MediumTerm));
    assert!(second.metadata.cost.tokens_saved >= 1);
    assert_eq!(second.value, json!("counted"));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn roster_context_includes_the_requesting_agent() {
    init_tracing();
    let engine = default_engine();
    let (ctx, _stores) = seeded_ctx("orch-1");

    let result = engine
        .resolve_placeholder("{CONTEXT:workflow:current:agent-roles}", &ctx)
        .await
        .unwrap();
    let roster = result.value.as_array().expect("roster is an array");
    assert!(roster.contains(&json!("planner")));
    assert!(roster.contains(&json!("executor")));
    assert!(roster.contains(&json!("orch-1")));

    // the cached copy carries the roster rule already applied
    let repeat = engine
        .resolve_placeholder("{CONTEXT:workflow:current:agent-roles}", &ctx)
        .await
        .unwrap();
    assert!(repeat.metadata.cache_hit);
    assert_eq!(repeat.metadata.cache_tier, Some(CachePolicy::MediumTerm));
    assert!(repeat.value.as_array().unwrap().contains(&json!("orch-1")));
}

#[tokio::test]
async fn malformed_placeholder_fails_alone() {
    init_tracing();
    let engine = default_engine();
    let (ctx, _stores) = seeded_ctx("orch-1");

    let template = "ok {CONTEXT:workflow:current:phase} bad {DATA:v1:only-two-segments} end";
    let result = engine.resolve_template(template, &ctx).await.unwrap();

    assert_eq!(result.status, BatchStatus::Partial);
    assert_eq!(result.resolutions.len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        result.errors[0],
        TokenError::MalformedToken { .. }
    ));
    // the valid placeholder substituted, the malformed one untouched
    assert!(result.resolved_text.contains("ok execution"));
    assert!(result.resolved_text.contains("{DATA:v1:only-two-segments}"));
}

#[tokio::test]
async fn dependency_layers_resolve_in_declared_order() {
    init_tracing();
    let engine = default_engine();
    let (ctx, stores) = seeded_ctx("orch-1");
    stores.context.seed("workflow", "current", "alpha", json!("a"));
    stores.context.seed("workflow", "current", "beta", json!("b"));

    let beta = Token::new(TokenType::Context, "workflow", "current", "beta");
    let alpha = Token::new(TokenType::Context, "workflow", "current", "alpha")
        .with_dependency(beta.id.clone());

    // alpha listed first, but beta must run in an earlier layer
    let result = engine
        .resolve_batch(vec![alpha.clone(), beta.clone()], &ctx)
        .await
        .unwrap();
    assert_eq!(result.status, BatchStatus::Success);
    assert_eq!(result.resolutions.len(), 2);

    let beta_pos = result
        .execution_order
        .iter()
        .position(|id| *id == beta.id)
        .expect("beta executed");
    let alpha_pos = result
        .execution_order
        .iter()
        .position(|id| *id == alpha.id)
        .expect("alpha executed");
    assert!(beta_pos < alpha_pos);
}

#[tokio::test]
async fn dependency_on_resubmitted_coordinates_follows_live_token() {
    init_tracing();
    let engine = default_engine();
    let (ctx, stores) = seeded_ctx("orch-1");
    stores.context.seed("workflow", "current", "alpha", json!("a"));

    // first batch leaves a live registry entry at these coordinates
    let warmed = engine
        .resolve_template("{CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap();
    assert_eq!(warmed.status, BatchStatus::Success);

    // a later batch re-submits the coordinates under a fresh id and
    // declares a dependency on that id; interning coalesces the fresh
    // token into the live entry, and the edge has to come along
    let fresh = Token::new(TokenType::Context, "workflow", "current", "phase");
    let dependent = Token::new(TokenType::Context, "workflow", "current", "alpha")
        .with_dependency(fresh.id.clone());

    let result = engine
        .resolve_batch(vec![fresh.clone(), dependent], &ctx)
        .await
        .unwrap();
    assert_eq!(result.status, BatchStatus::Success);
    assert!(result.errors.is_empty());
    assert_eq!(result.resolutions.len(), 2);

    let alpha = result
        .resolutions
        .iter()
        .find(|r| r.placeholder == "{CONTEXT:workflow:current:alpha}")
        .expect("dependent resolved");
    assert_eq!(alpha.value, json!("a"));

    let phase = result
        .resolutions
        .iter()
        .find(|r| r.placeholder == "{CONTEXT:workflow:current:phase}")
        .expect("warmed coordinates resolved");
    let stored = engine.token(&alpha.token_id).expect("dependent registered");
    assert!(stored.dependencies.contains(&phase.token_id));
    assert!(!stored.dependencies.contains(&fresh.id));
}

#[tokio::test]
async fn cycle_members_fail_while_disjoint_tokens_resolve() {
    init_tracing();
    let engine = default_engine();
    let (ctx, _stores) = seeded_ctx("orch-1");

    let first = Token::new(TokenType::Context, "workflow", "current", "cycle-a");
    let second = Token::new(TokenType::Context, "workflow", "current", "cycle-b")
        .with_dependency(first.id.clone());
    let first = first.with_dependency(second.id.clone());
    let standalone = Token::new(TokenType::Context, "workflow", "current", "phase");

    let result = engine
        .resolve_batch(vec![first, second, standalone], &ctx)
        .await
        .unwrap();

    assert_eq!(result.status, BatchStatus::Partial);
    assert_eq!(result.resolutions.len(), 1);
    assert_eq!(result.resolutions[0].value, json!("execution"));

    let cycle = result
        .errors
        .iter()
        .find_map(|err| match err {
            TokenError::DependencyCycle { members } => Some(members),
            _ => None,
        })
        .expect("cycle error reported");
    assert_eq!(cycle.len(), 2);
}

#[tokio::test]
async fn dependency_skip_substitutes_sentinel() {
    init_tracing();
    let config = EngineConfig {
        failure: FailurePolicy::default().with_mode(FailureMode::DependencySkip),
        ..Default::default()
    };
    let engine = ResolutionEngine::with_default_resolvers(config).unwrap();
    let (ctx, _stores) = seeded_ctx("orch-1");

    let orphan_dep = token_types::TokenId::generate();
    let token = Token::new(TokenType::Context, "workflow", "current", "phase")
        .with_dependency(orphan_dep);

    let resolution = engine.resolve_token(token, &ctx).await.unwrap();
    assert_eq!(resolution.value, json!(DEPENDENCY_SENTINEL));
    assert!(resolution.metadata.degraded);
    assert!(!resolution.metadata.warnings.is_empty());
}

#[tokio::test]
async fn wrong_type_fallback_is_skipped_for_the_next_one() {
    init_tracing();
    let executed = Arc::new(AtomicBool::new(false));
    let config = EngineConfig {
        failure: FailurePolicy::default()
            .with_mode(FailureMode::FallbackResolver)
            .with_max_retries(0)
            .with_fallback(ResolverId::new("state-alt"))
            .with_fallback(ResolverId::new("context-alt")),
        ..Default::default()
    };
    let engine = ResolutionEngine::new(config);
    engine.register_resolver(Arc::new(AlwaysFails)).unwrap();
    engine
        .register_fallback_resolver(Arc::new(WrongTypeFallback {
            executed: executed.clone(),
        }))
        .unwrap();
    engine
        .register_fallback_resolver(Arc::new(ContextFallback))
        .unwrap();
    let (ctx, _stores) = seeded_ctx("orch-1");

    let resolution = engine
        .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap();

    assert_eq!(resolution.value, json!("fallback-value"));
    assert!(resolution.metadata.fallback_used);
    assert_eq!(resolution.metadata.resolver, Some(ResolverId::new("context-alt")));
    // the mismatched fallback was rejected before its body ran
    assert!(!executed.load(Ordering::SeqCst));
    assert!(!resolution.metadata.warnings.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_cache_serves_after_resolver_failure() {
    init_tracing();
    let calls = Arc::new(AtomicU32::new(0));
    let config = EngineConfig {
        failure: FailurePolicy::default().with_max_retries(0).allow_stale(),
        ..Default::default()
    };
    let engine = ResolutionEngine::new(config);
    engine
        .register_resolver(Arc::new(FailAfterFirst {
            calls: calls.clone(),
        }))
        .unwrap();
    let (ctx, _stores) = seeded_ctx("orch-1");

    let live = engine
        .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap();
    assert_eq!(live.value, json!("live"));
    assert!(!live.metadata.stale);

    // entry expires, resolver now fails, stale copy is served flagged
    tokio::time::advance(Duration::from_secs(2)).await;
    let stale = engine
        .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap();
    assert_eq!(stale.value, json!("live"));
    assert!(stale.metadata.stale);
    assert!(stale.metadata.fallback_used);
    assert!(stale
        .metadata
        .warnings
        .iter()
        .any(|w| w.contains("stale cache served")));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn timeout_budget_is_terminal() {
    init_tracing();
    let config = EngineConfig {
        failure: FailurePolicy::default()
            .with_timeout_ms(100)
            .with_max_retries(5),
        ..Default::default()
    };
    let engine = ResolutionEngine::new(config);
    engine.register_resolver(Arc::new(NeverFinishes)).unwrap();
    let (ctx, _stores) = seeded_ctx("orch-1");

    let token = Token::new(TokenType::Context, "workflow", "current", "phase");
    let err = engine.resolve_token(token, &ctx).await.unwrap_err();

    match err {
        TokenError::Timeout { budget_ms, .. } => assert_eq!(budget_ms, 100),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn unavailable_remote_cache_degrades_to_miss() {
    init_tracing();
    let remote = Arc::new(InMemoryKeyValue::new());
    remote.set_unavailable(true);
    let engine = ResolutionEngine::with_remote_cache(EngineConfig::default(), remote.clone());
    engine.register_default_resolvers().unwrap();
    let (ctx, _stores) = seeded_ctx("orch-1");

    // backend down: resolution succeeds anyway, write-through dropped
    let result = engine
        .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap();
    assert_eq!(result.value, json!("execution"));
    assert!(remote.is_empty());

    // the local tier still serves repeats
    let repeat = engine
        .resolve_placeholder("{CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap();
    assert!(repeat.metadata.cache_hit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_agent_cost_sums_match_global_under_concurrency() {
    init_tracing();
    let engine = Arc::new(default_engine());

    let mut handles = Vec::new();
    for worker in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let agent = format!("agent-{}", worker);
            let (ctx, _stores) = seeded_ctx(&agent);
            for _ in 0..25 {
                let result = engine
                    .resolve_template(
                        "p={CONTEXT:workflow:current:phase} t={METRICS:performance:last-hour:throughput}",
                        &ctx,
                    )
                    .await
                    .unwrap();
                assert_eq!(result.status, BatchStatus::Success);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let summary = engine.cost_summary();
    assert_eq!(summary.totals.resolutions, 4 * 25 * 2);
    assert_eq!(summary.agents.len(), 4);

    let mut agent_sum = token_engine::CostTotals::default();
    for totals in summary.agents.values() {
        agent_sum.add(totals);
    }
    assert_eq!(agent_sum, summary.totals);

    // every resolution consulted the cache; concurrent first misses on
    // the same key are allowed, so only the split's bounds are fixed
    assert_eq!(
        summary.totals.cache_hits + summary.totals.cache_misses,
        4 * 25 * 2
    );
    assert!(summary.totals.cache_misses >= 2);
    assert!(summary.totals.cache_hits > 0);
}

#[tokio::test]
async fn duplicate_primary_registration_fails_fast() {
    init_tracing();
    let engine = default_engine();

    let err = engine
        .register_resolver(Arc::new(token_engine::ContextResolver::new()))
        .unwrap_err();
    assert!(matches!(
        err,
        TokenError::DuplicateResolver {
            token_type: TokenType::Context
        }
    ));
}

#[tokio::test]
async fn shutdown_returns_final_summary_then_refuses_work() {
    init_tracing();
    let engine = default_engine();
    let (ctx, _stores) = seeded_ctx("orch-1");

    engine
        .resolve_template("p={CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap();

    let summary = engine.shutdown().await;
    assert_eq!(summary.totals.resolutions, 1);
    assert_eq!(summary.agents.len(), 1);

    let err = engine
        .resolve_template("p={CONTEXT:workflow:current:phase}", &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::EngineClosed));
}
