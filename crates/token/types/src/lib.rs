//! Token domain types for Tokenflow.
//!
//! A *token* is a typed placeholder embedded in multi-agent workflow
//! template text, written `{TYPE:a:b:c}`. Five disjoint kinds exist:
//! - **CONTEXT**: workflow and conversation context (read-only)
//! - **DATA**: knowledge lookups backed by vector search
//! - **STATE**: agent and workflow runtime state (observation only)
//! - **METRICS**: precomputed performance metrics
//! - **TEMPORAL**: schedule and time values (never cached)
//!
//! This crate holds the shared vocabulary: the token model and its
//! lifecycle, the closed [`TokenType`] set with per-type placeholder
//! patterns, cache tiers keyed by logical identity, failure policies,
//! cost attribution primitives, and the error taxonomy. Parsing lives
//! in `token-parser`; resolution in `token-engine`.

#![deny(unsafe_code)]

pub mod cache;
pub mod cost;
pub mod errors;
pub mod id;
pub mod outcome;
pub mod pattern;
pub mod policy;
pub mod token;

pub use cache::{CacheKey, CachePolicy};
pub use cost::CostImpact;
pub use errors::{TokenError, TokenResult};
pub use id::{AgentId, ResolverId, StepId, TokenId, WorkflowId};
pub use outcome::{
    BatchStatus, ResolutionMetadata, ResolverOutcome, TokenResolution, ValidationIssue,
    ValidationReport,
};
pub use pattern::{TokenPattern, TokenType};
pub use policy::{FailureMode, FailurePolicy, DEPENDENCY_SENTINEL};
pub use token::{Token, TokenLifecycle, TokenMetadata, TokenPermissions, UsageStats};
