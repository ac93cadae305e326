//! Error taxonomy shared across the token crates

use crate::id::{AgentId, ResolverId};
use crate::pattern::TokenType;
use thiserror::Error;

/// Errors surfaced by parsing, registration, and resolution.
///
/// Template resolution never throws these across its API boundary:
/// per-token failures are collected into the result. They reach the
/// caller directly only from single-token and wiring-level calls.
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error("Malformed placeholder at byte {position}: {reason} ({placeholder})")]
    MalformedToken {
        placeholder: String,
        position: usize,
        reason: String,
    },

    #[error("Type boundary violation: {expected} resolver invoked on {actual} token")]
    TypeBoundaryViolation {
        expected: TokenType,
        actual: TokenType,
    },

    #[error("Resolver already registered for token type {token_type}")]
    DuplicateResolver { token_type: TokenType },

    #[error("No resolver registered for token type {0}")]
    NoResolverForType(TokenType),

    #[error("No resolver registered under id '{0}'")]
    UnknownResolver(ResolverId),

    #[error("Validation failed for '{token}': {detail}")]
    ValidationFailed { token: String, detail: String },

    #[error("Agent '{agent}' may not resolve '{token}'")]
    PermissionDenied { token: String, agent: AgentId },

    #[error("Resolution failed for '{token}': {reason}")]
    ResolutionFailure { token: String, reason: String },

    #[error("Resolution of '{token}' exceeded its {budget_ms}ms budget")]
    Timeout { token: String, budget_ms: u64 },

    #[error("Dependency cycle among tokens: {members:?}")]
    DependencyCycle { members: Vec<String> },

    #[error("'{token}' depends on unresolved '{dependency}'")]
    UnresolvedDependency { token: String, dependency: String },

    #[error("Cache backend unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Engine is shut down")]
    EngineClosed,
}

pub type TokenResult<T> = Result<T, TokenError>;

impl TokenError {
    /// Transient faults worth another attempt. Timeouts are terminal:
    /// the budget covers the whole attempt sequence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TokenError::ResolutionFailure { .. }
                | TokenError::Store(_)
                | TokenError::CacheUnavailable(_)
        )
    }

    /// Wiring faults: never retried and never degraded into a value.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TokenError::TypeBoundaryViolation { .. }
                | TokenError::DuplicateResolver { .. }
                | TokenError::NoResolverForType(_)
                | TokenError::UnknownResolver(_)
                | TokenError::ValidationFailed { .. }
                | TokenError::PermissionDenied { .. }
                | TokenError::EngineClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transient = TokenError::ResolutionFailure {
            token: "t".to_string(),
            reason: "backend hiccup".to_string(),
        };
        assert!(transient.is_retryable());

        let timeout = TokenError::Timeout {
            token: "t".to_string(),
            budget_ms: 100,
        };
        assert!(!timeout.is_retryable());

        let boundary = TokenError::TypeBoundaryViolation {
            expected: TokenType::Context,
            actual: TokenType::Data,
        };
        assert!(!boundary.is_retryable());
        assert!(boundary.is_configuration());
    }

    #[test]
    fn test_messages_name_the_token() {
        let err = TokenError::Timeout {
            token: "{DATA:embeddings:v2:profile}".to_string(),
            budget_ms: 250,
        };
        let message = err.to_string();
        assert!(message.contains("{DATA:embeddings:v2:profile}"));
        assert!(message.contains("250ms"));
    }
}
