//! Resolver registry and the type boundary gate.
//!
//! One primary resolver per token type, plus any number of fallback
//! resolvers addressable by id. Every dispatch re-checks that resolver
//! and token agree on type; a mismatch is rejected before the resolver
//! body runs.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use token_types::{
    ResolverId, ResolverOutcome, Token, TokenError, TokenResult, TokenType, ValidationReport,
};

use crate::context::ResolverContext;
use crate::resolvers::TokenResolver;

/// Holds the primaries (one per type) and an id index over every
/// registered resolver, fallbacks included.
pub struct ResolverRegistry {
    primaries: DashMap<TokenType, Arc<dyn TokenResolver>>,
    by_id: DashMap<ResolverId, Arc<dyn TokenResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self {
            primaries: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    /// Register the primary resolver for its type. Exactly one primary
    /// per type; a second registration fails fast.
    pub fn register(&self, resolver: Arc<dyn TokenResolver>) -> TokenResult<()> {
        let token_type = resolver.token_type();
        self.index_by_id(&resolver)?;
        match self.primaries.entry(token_type) {
            Entry::Occupied(_) => {
                self.by_id.remove(&resolver.id());
                Err(TokenError::DuplicateResolver { token_type })
            }
            Entry::Vacant(slot) => {
                info!(resolver = %resolver.id(), token_type = %token_type, "Registered primary resolver");
                slot.insert(resolver);
                Ok(())
            }
        }
    }

    /// Register a fallback resolver, addressable only by id from
    /// failure policies. Ids share one namespace with primaries.
    pub fn register_fallback(&self, resolver: Arc<dyn TokenResolver>) -> TokenResult<()> {
        info!(resolver = %resolver.id(), token_type = %resolver.token_type(), "Registered fallback resolver");
        self.index_by_id(&resolver)
    }

    fn index_by_id(&self, resolver: &Arc<dyn TokenResolver>) -> TokenResult<()> {
        match self.by_id.entry(resolver.id()) {
            Entry::Occupied(_) => Err(TokenError::DuplicateResolver {
                token_type: resolver.token_type(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(resolver.clone());
                Ok(())
            }
        }
    }

    pub fn primary_for(&self, token_type: TokenType) -> TokenResult<Arc<dyn TokenResolver>> {
        self.primaries
            .get(&token_type)
            .map(|entry| entry.value().clone())
            .ok_or(TokenError::NoResolverForType(token_type))
    }

    pub fn by_id(&self, id: &ResolverId) -> TokenResult<Arc<dyn TokenResolver>> {
        self.by_id
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TokenError::UnknownResolver(id.clone()))
    }

    /// Structural validation through the token's primary resolver.
    pub fn validate(&self, token: &Token) -> TokenResult<ValidationReport> {
        let resolver = self.primary_for(token.token_type())?;
        Ok(resolver.validate(token))
    }

    /// The boundary gate. A mismatched pairing is rejected here, so a
    /// resolver body never observes a token of another type.
    pub async fn dispatch(
        &self,
        resolver: &Arc<dyn TokenResolver>,
        token: &Token,
        ctx: &ResolverContext,
    ) -> TokenResult<ResolverOutcome> {
        if resolver.token_type() != token.token_type() {
            return Err(TokenError::TypeBoundaryViolation {
                expected: resolver.token_type(),
                actual: token.token_type(),
            });
        }
        resolver.resolve(token, ctx).await
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
