//! CONTEXT resolver: shared workflow context, read-only

use async_trait::async_trait;
use serde_json::Value;

use token_types::{
    CostImpact, ResolverId, ResolverOutcome, Token, TokenError, TokenResult, TokenType,
};

use crate::context::ResolverContext;

use super::TokenResolver;

/// Identifier whose value is the agent roster for the scope.
const ROSTER_IDENTIFIER: &str = "agent-roles";

/// Resolves `{CONTEXT:namespace:scope:element}` from the context store.
///
/// Strictly read-only. The one piece of synthesis it performs is the
/// roster rule: an `agent-roles` element always lists the requesting
/// agent, even when the stored roster predates it.
pub struct ContextResolver {
    id: ResolverId,
}

impl ContextResolver {
    pub fn new() -> Self {
        Self {
            id: ResolverId::new("context-primary"),
        }
    }
}

impl Default for ContextResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenResolver for ContextResolver {
    fn id(&self) -> ResolverId {
        self.id.clone()
    }

    fn token_type(&self) -> TokenType {
        TokenType::Context
    }

    async fn resolve(&self, token: &Token, ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        let stored = ctx
            .stores
            .context
            .fetch(&token.namespace, &token.scope, &token.identifier)
            .await?;
        let cost = CostImpact {
            compute_units: 1,
            ..Default::default()
        };

        if token.identifier == ROSTER_IDENTIFIER {
            let mut roster: Vec<Value> = match stored {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            let requester = Value::String(ctx.agent_id.to_string());
            if !roster.contains(&requester) {
                roster.push(requester);
            }
            return Ok(ResolverOutcome::new(Value::Array(roster)).with_cost(cost));
        }

        match stored {
            Some(value) => Ok(ResolverOutcome::new(value).with_cost(cost)),
            None => Err(TokenError::ResolutionFailure {
                token: token.placeholder.clone(),
                reason: format!(
                    "no context entry for '{}:{}:{}'",
                    token.namespace, token.scope, token.identifier
                ),
            }),
        }
    }
}
