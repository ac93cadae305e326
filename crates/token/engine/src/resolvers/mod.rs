//! Resolver trait and the five built-in resolvers.
//!
//! Each resolver serves exactly one token type. The registry enforces
//! that boundary before any resolver body runs, and `validate` runs
//! before every `resolve` so malformed coordinates never reach a store.

pub mod context;
pub mod data;
pub mod metrics;
pub mod state;
pub mod temporal;

use std::sync::Arc;

use async_trait::async_trait;

use token_types::{
    ResolverId, ResolverOutcome, Token, TokenPattern, TokenResult, TokenType, ValidationIssue,
    ValidationReport,
};

use crate::context::ResolverContext;

pub use self::context::ContextResolver;
pub use self::data::DataResolver;
pub use self::metrics::MetricsResolver;
pub use self::state::StateResolver;
pub use self::temporal::TemporalResolver;

/// A resolver for exactly one token type.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// Stable id, unique across primaries and fallbacks alike.
    fn id(&self) -> ResolverId;

    /// The single type this resolver serves.
    fn token_type(&self) -> TokenType;

    /// Structural validation, run before `resolve` on every path.
    ///
    /// The default checks the type boundary and rejects empty segments
    /// and segments containing the reserved `:` or `}`. Implementations
    /// may extend it but must stay side-effect free.
    fn validate(&self, token: &Token) -> ValidationReport {
        let mut report = ValidationReport::ok();
        if token.token_type() != self.token_type() {
            report.push(ValidationIssue::TypeBoundary {
                expected: self.token_type(),
                actual: token.token_type(),
            });
        }
        let pattern = TokenPattern::of(token.token_type());
        let segments = [
            (&token.namespace, 0),
            (&token.scope, 1),
            (&token.identifier, 2),
        ];
        for (value, index) in segments {
            let name = &pattern.segment_names[index];
            if value.is_empty() {
                report.push(ValidationIssue::EmptySegment {
                    segment: name.clone(),
                });
            } else if value.contains(':') || value.contains('}') {
                report.push(ValidationIssue::StructuralMismatch {
                    detail: format!("segment '{}' contains reserved characters", name),
                });
            }
        }
        report
    }

    /// Produce the token's value. Only called after `validate` passed
    /// and the registry confirmed the type boundary.
    async fn resolve(&self, token: &Token, ctx: &ResolverContext) -> TokenResult<ResolverOutcome>;
}

impl std::fmt::Debug for dyn TokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResolver")
            .field("id", &self.id())
            .field("token_type", &self.token_type())
            .finish()
    }
}

/// The five built-in primaries, one per token type.
pub fn builtin_resolvers() -> Vec<Arc<dyn TokenResolver>> {
    vec![
        Arc::new(ContextResolver::new()),
        Arc::new(DataResolver::new()),
        Arc::new(StateResolver::new()),
        Arc::new(MetricsResolver::new()),
        Arc::new(TemporalResolver::new()),
    ]
}
