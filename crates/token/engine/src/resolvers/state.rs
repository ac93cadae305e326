//! STATE resolver: live agent and workflow state, read-only

use async_trait::async_trait;

use token_types::{
    CostImpact, ResolverId, ResolverOutcome, Token, TokenError, TokenResult, TokenType,
};

use crate::context::ResolverContext;

use super::TokenResolver;

/// Resolves `{STATE:kind:subject:key}` by observing the state store.
///
/// Observation only. Mutating live state through a placeholder would
/// make template rendering a side-effecting operation, so the store
/// trait does not even expose a write.
pub struct StateResolver {
    id: ResolverId,
}

impl StateResolver {
    pub fn new() -> Self {
        Self {
            id: ResolverId::new("state-primary"),
        }
    }
}

impl Default for StateResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenResolver for StateResolver {
    fn id(&self) -> ResolverId {
        self.id.clone()
    }

    fn token_type(&self) -> TokenType {
        TokenType::State
    }

    async fn resolve(&self, token: &Token, ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        let observed = ctx
            .stores
            .state
            .observe(&token.namespace, &token.scope, &token.identifier)
            .await?;
        match observed {
            Some(value) => Ok(ResolverOutcome::new(value).with_cost(CostImpact {
                compute_units: 1,
                ..Default::default()
            })),
            None => Err(TokenError::ResolutionFailure {
                token: token.placeholder.clone(),
                reason: format!(
                    "no observable state for '{}:{}:{}'",
                    token.namespace, token.scope, token.identifier
                ),
            }),
        }
    }
}
