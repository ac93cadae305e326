//! METRICS resolver: precomputed aggregates only

use async_trait::async_trait;

use token_types::{
    CostImpact, ResolverId, ResolverOutcome, Token, TokenError, TokenResult, TokenType,
};

use crate::context::ResolverContext;

use super::TokenResolver;

/// Resolves `{METRICS:category:timeframe:metric}` from stored
/// aggregates. A metric that was never computed is a resolution
/// failure; this resolver does not run aggregations on demand.
pub struct MetricsResolver {
    id: ResolverId,
}

impl MetricsResolver {
    pub fn new() -> Self {
        Self {
            id: ResolverId::new("metrics-primary"),
        }
    }
}

impl Default for MetricsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenResolver for MetricsResolver {
    fn id(&self) -> ResolverId {
        self.id.clone()
    }

    fn token_type(&self) -> TokenType {
        TokenType::Metrics
    }

    async fn resolve(&self, token: &Token, ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        let reported = ctx
            .stores
            .metrics
            .report(&token.namespace, &token.scope, &token.identifier)
            .await?;
        match reported {
            Some(value) => Ok(ResolverOutcome::new(value).with_cost(CostImpact {
                compute_units: 1,
                ..Default::default()
            })),
            None => Err(TokenError::ResolutionFailure {
                token: token.placeholder.clone(),
                reason: format!(
                    "metric '{}' not precomputed for '{}' over '{}'",
                    token.identifier, token.namespace, token.scope
                ),
            }),
        }
    }
}
