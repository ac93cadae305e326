//! DATA resolver: vector search first, exact match as fallback

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;

use token_types::{
    CostImpact, ResolverId, ResolverOutcome, Token, TokenError, TokenResult, TokenType,
};

use crate::context::ResolverContext;

use super::TokenResolver;

/// Resolves `{DATA:type:version:identifier}`.
///
/// The namespace names the vector collection; the search filters on the
/// identifier and version fields of stored payloads. When the search
/// errors or returns nothing, the deterministic exact-match store is
/// consulted and the outcome is marked as a fallback.
pub struct DataResolver {
    id: ResolverId,
    search_limit: usize,
}

impl DataResolver {
    pub fn new() -> Self {
        Self {
            id: ResolverId::new("data-primary"),
            search_limit: 5,
        }
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    async fn exact_fallback(
        &self,
        token: &Token,
        ctx: &ResolverContext,
        cost: CostImpact,
    ) -> TokenResult<ResolverOutcome> {
        let found = ctx
            .stores
            .data
            .lookup(&token.namespace, &token.scope, &token.identifier)
            .await?;
        match found {
            Some(value) => Ok(ResolverOutcome::new(value).with_fallback().with_cost(cost)),
            None => Err(TokenError::ResolutionFailure {
                token: token.placeholder.clone(),
                reason: format!(
                    "no vector hit and no exact match for '{}:{}:{}'",
                    token.namespace, token.scope, token.identifier
                ),
            }),
        }
    }
}

impl Default for DataResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenResolver for DataResolver {
    fn id(&self) -> ResolverId {
        self.id.clone()
    }

    fn token_type(&self) -> TokenType {
        TokenType::Data
    }

    async fn resolve(&self, token: &Token, ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        let mut filter = HashMap::new();
        filter.insert("identifier".to_string(), token.identifier.clone());
        filter.insert("version".to_string(), token.scope.clone());

        let cost = CostImpact {
            compute_units: 1,
            vector_queries: 1,
            ..Default::default()
        };

        match ctx
            .stores
            .vector
            .search(&token.namespace, &filter, self.search_limit)
            .await
        {
            Ok(hits) => {
                if let Some(best) = hits.into_iter().next() {
                    return Ok(ResolverOutcome::new(best.payload).with_cost(cost));
                }
                self.exact_fallback(token, ctx, cost).await
            }
            Err(err) => {
                warn!(
                    token = %token.placeholder,
                    error = %err,
                    "Vector search failed, trying exact match"
                );
                self.exact_fallback(token, ctx, cost).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{SearchHit, StoreHandles};
    use serde_json::json;
    use token_types::AgentId;

    fn make_ctx() -> (ResolverContext, crate::stores::InMemoryStores) {
        let (handles, stores) = StoreHandles::in_memory();
        (ResolverContext::new(AgentId::new("agent-a"), handles), stores)
    }

    fn make_token() -> Token {
        Token::new(TokenType::Data, "docs", "v1", "readme")
    }

    #[tokio::test]
    async fn test_best_vector_hit_wins() {
        let (ctx, stores) = make_ctx();
        stores.vector.seed(
            "docs",
            SearchHit::new("old", 0.4, json!({"identifier": "readme", "version": "v1", "body": "old"})),
        );
        stores.vector.seed(
            "docs",
            SearchHit::new("new", 0.9, json!({"identifier": "readme", "version": "v1", "body": "new"})),
        );

        let outcome = DataResolver::new().resolve(&make_token(), &ctx).await.unwrap();
        assert_eq!(outcome.value["body"], json!("new"));
        assert!(!outcome.fallback_used);
        assert_eq!(outcome.cost.vector_queries, 1);
    }

    #[tokio::test]
    async fn test_empty_search_falls_back_to_exact_match() {
        let (ctx, stores) = make_ctx();
        stores.data.seed("docs", "v1", "readme", json!({"body": "exact"}));

        let outcome = DataResolver::new().resolve(&make_token(), &ctx).await.unwrap();
        assert_eq!(outcome.value, json!({"body": "exact"}));
        assert!(outcome.fallback_used);
    }

    #[tokio::test]
    async fn test_search_error_falls_back_to_exact_match() {
        let (ctx, stores) = make_ctx();
        stores.vector.set_unavailable(true);
        stores.data.seed("docs", "v1", "readme", json!({"body": "exact"}));

        let outcome = DataResolver::new().resolve(&make_token(), &ctx).await.unwrap();
        assert!(outcome.fallback_used);
    }

    #[tokio::test]
    async fn test_nothing_anywhere_fails() {
        let (ctx, _stores) = make_ctx();
        let err = DataResolver::new().resolve(&make_token(), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("no vector hit"));
    }

    #[tokio::test]
    async fn test_version_filter_excludes_other_versions() {
        let (ctx, stores) = make_ctx();
        stores.vector.seed(
            "docs",
            SearchHit::new("v2-doc", 0.95, json!({"identifier": "readme", "version": "v2"})),
        );
        stores.data.seed("docs", "v1", "readme", json!({"body": "v1-exact"}));

        let outcome = DataResolver::new().resolve(&make_token(), &ctx).await.unwrap();
        assert_eq!(outcome.value, json!({"body": "v1-exact"}));
        assert!(outcome.fallback_used);
    }
}
