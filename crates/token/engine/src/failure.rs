//! Failure policy execution.
//!
//! Wraps every resolver call in the policy's retry loop and time
//! budget, then applies the policy's terminal behavior when the
//! attempts run out. Configuration faults (boundary violations,
//! missing resolvers, permission problems) pass straight through: a
//! miswired engine must fail loudly, not serve defaults.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use token_types::{
    FailureMode, FailurePolicy, ResolverId, ResolverOutcome, Token, TokenError, TokenResult,
};

use crate::cache::TokenCache;
use crate::context::ResolverContext;
use crate::registry::ResolverRegistry;
use crate::resolvers::TokenResolver;

/// What policy execution produced, with every degradation flag the
/// engine needs for result metadata.
#[derive(Clone, Debug)]
pub struct PolicyOutcome {
    pub outcome: ResolverOutcome,
    /// Resolver that produced the value; `None` for stale and degraded
    /// values, which no resolver produced
    pub resolver: Option<ResolverId>,
    /// Retries actually performed (first attempt excluded)
    pub retries: u32,
    /// Policy substituted the default value
    pub degraded: bool,
    /// An expired cache entry was served
    pub stale: bool,
    /// A fallback resolver produced the value
    pub fallback_resolver_used: bool,
    pub warnings: Vec<String>,
}

/// Runs resolvers under a [`FailurePolicy`].
pub struct FailureEngine {
    registry: Arc<ResolverRegistry>,
    cache: Arc<TokenCache>,
}

impl FailureEngine {
    pub fn new(registry: Arc<ResolverRegistry>, cache: Arc<TokenCache>) -> Self {
        Self { registry, cache }
    }

    /// Resolve `token` through its primary under `policy`.
    pub async fn execute(
        &self,
        policy: &FailurePolicy,
        token: &Token,
        ctx: &ResolverContext,
    ) -> TokenResult<PolicyOutcome> {
        let primary = self.registry.primary_for(token.token_type())?;
        let attempts = AtomicU32::new(0);

        let run = self.run_attempts(policy, &primary, token, ctx, &attempts);
        let result = match timeout(policy.budget(), run).await {
            Ok(result) => result,
            Err(_) => Err(TokenError::Timeout {
                token: token.placeholder.clone(),
                budget_ms: policy.timeout_ms,
            }),
        };
        let retries = attempts.load(Ordering::Relaxed);

        match result {
            Ok(outcome) => Ok(PolicyOutcome {
                outcome,
                resolver: Some(primary.id()),
                retries,
                degraded: false,
                stale: false,
                fallback_resolver_used: false,
                warnings: Vec::new(),
            }),
            Err(err) => self.recover(policy, token, ctx, err, retries).await,
        }
    }

    /// The retry loop. Backoff delays count against the caller's
    /// budget; non-retryable errors end the loop at once.
    async fn run_attempts(
        &self,
        policy: &FailurePolicy,
        resolver: &Arc<dyn TokenResolver>,
        token: &Token,
        ctx: &ResolverContext,
        attempts: &AtomicU32,
    ) -> TokenResult<ResolverOutcome> {
        let mut last_err = None;
        for attempt in 0..=policy.max_retries {
            if attempt > 0 {
                sleep(policy.backoff_delay(attempt - 1)).await;
                attempts.fetch_add(1, Ordering::Relaxed);
                debug!(token = %token.placeholder, attempt, "Retrying resolution");
            }
            match self.registry.dispatch(resolver, token, ctx).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| TokenError::ResolutionFailure {
            token: token.placeholder.clone(),
            reason: "retries exhausted".to_string(),
        }))
    }

    /// Terminal behavior once the attempts are spent.
    async fn recover(
        &self,
        policy: &FailurePolicy,
        token: &Token,
        ctx: &ResolverContext,
        err: TokenError,
        retries: u32,
    ) -> TokenResult<PolicyOutcome> {
        if err.is_configuration() {
            return Err(err);
        }

        // stale serving applies under CacheStaleOk and whenever the
        // policy opted in, regardless of mode
        if policy.allow_stale_cache || policy.mode == FailureMode::CacheStaleOk {
            if let Some((value, age)) = self.cache.lookup_stale(&token.cache_key()) {
                warn!(
                    token = %token.placeholder,
                    age_secs = age.as_secs(),
                    error = %err,
                    "Serving stale cache entry after resolver failure"
                );
                return Ok(PolicyOutcome {
                    outcome: ResolverOutcome::new(value),
                    resolver: None,
                    retries,
                    degraded: false,
                    stale: true,
                    fallback_resolver_used: false,
                    warnings: vec![format!("stale cache served after failure: {}", err)],
                });
            }
        }

        match policy.mode {
            FailureMode::GracefulDegradation => {
                let value = policy.default_value.clone().unwrap_or(Value::Null);
                warn!(token = %token.placeholder, error = %err, "Degrading to default value");
                Ok(PolicyOutcome {
                    outcome: ResolverOutcome::new(value),
                    resolver: None,
                    retries,
                    degraded: true,
                    stale: false,
                    fallback_resolver_used: false,
                    warnings: vec![format!("degraded to default value: {}", err)],
                })
            }
            FailureMode::FallbackResolver => self.try_fallbacks(policy, token, ctx, err, retries).await,
            // stale was already attempted above; nothing else to offer
            FailureMode::CacheStaleOk => Err(err),
            // dependency handling happens at batch level; for the failed
            // token itself both remaining modes surface the error
            FailureMode::DependencySkip | FailureMode::ErrorPropagation => Err(err),
        }
    }

    async fn try_fallbacks(
        &self,
        policy: &FailurePolicy,
        token: &Token,
        ctx: &ResolverContext,
        err: TokenError,
        retries: u32,
    ) -> TokenResult<PolicyOutcome> {
        let mut warnings = vec![format!("primary resolver failed: {}", err)];
        for fallback_id in &policy.fallback_resolvers {
            let fallback = match self.registry.by_id(fallback_id) {
                Ok(resolver) => resolver,
                Err(lookup_err) => {
                    warnings.push(lookup_err.to_string());
                    continue;
                }
            };
            // dispatch re-checks the boundary, so a fallback of the
            // wrong type is rejected here and the next one tried
            match self.registry.dispatch(&fallback, token, ctx).await {
                Ok(outcome) => {
                    warn!(
                        token = %token.placeholder,
                        fallback = %fallback_id,
                        "Fallback resolver served after primary failure"
                    );
                    warnings.push(format!("fallback resolver '{}' served", fallback_id));
                    return Ok(PolicyOutcome {
                        outcome,
                        resolver: Some(fallback_id.clone()),
                        retries,
                        degraded: false,
                        stale: false,
                        fallback_resolver_used: true,
                        warnings,
                    });
                }
                Err(fallback_err) => {
                    warnings.push(format!("fallback '{}' failed: {}", fallback_id, fallback_err));
                }
            }
        }
        Err(err)
    }
}
