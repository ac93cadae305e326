//! Token Resolution Engine for Tokenflow
//!
//! The engine turns templates containing typed placeholders such as
//! `{CONTEXT:workflow:current:agent-roles}` into resolved text. It
//! scans for the five token types, orders the batch by declared
//! dependencies, resolves each dependency layer concurrently, caches
//! values under tiered TTL policies, and attributes resolution cost to
//! the requesting agent.
//!
//! # Key Principle
//!
//! **A template resolution never fails as a whole because one
//! placeholder failed.**
//!
//! Malformed placeholders, resolver errors, and dependency cycles are
//! reported per token; everything else still resolves and the result
//! carries both the substituted text and the collected errors.
//!
//! # Architecture
//!
//! The [`ResolutionEngine`] composes specialized components:
//!
//! - [`ResolverRegistry`] — One primary resolver per token type, plus fallbacks
//! - [`TokenCache`] — Local tier with optional write-through shared backend
//! - [`DependencyTracker`] — Layers a batch; isolates cycle components
//! - [`FailureEngine`] — Retries, timeout budget, and failure-mode recovery
//! - [`TokenRegistry`] — Interned tokens keyed by logical coordinates
//! - [`CostLedger`] — Monotonic per-agent and global cost counters
//!
//! # Example
//!
//! ```rust,no_run
//! use token_engine::{EngineConfig, ResolutionEngine, ResolverContext};
//! use token_engine::stores::StoreHandles;
//! use token_types::AgentId;
//!
//! # #[tokio::main]
//! # async fn main() -> token_types::TokenResult<()> {
//! let engine = ResolutionEngine::with_default_resolvers(EngineConfig::default())?;
//! let (stores, seeds) = StoreHandles::in_memory();
//! seeds.context.seed("workflow", "current", "phase", serde_json::json!("review"));
//!
//! let ctx = ResolverContext::new(AgentId::new("orchestrator"), stores);
//! let result = engine
//!     .resolve_template("Current phase: {CONTEXT:workflow:current:phase}", &ctx)
//!     .await?;
//!
//! assert_eq!(result.resolved_text, "Current phase: review");
//! let summary = engine.shutdown().await;
//! assert_eq!(summary.totals.resolutions, 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod context;
pub mod cost;
pub mod dependency;
pub mod engine;
pub mod failure;
pub mod registry;
pub mod resolvers;
pub mod stores;
pub mod token_registry;

// Re-export main types
pub use cache::{CacheDecision, TokenCache};
pub use config::{CacheConfig, EngineConfig, RegistryConfig};
pub use context::ResolverContext;
pub use cost::{CostLedger, CostSummary, CostTotals};
pub use dependency::{DependencyTracker, ResolutionPlan};
pub use engine::{ResolutionEngine, TemplateResolution};
pub use failure::{FailureEngine, PolicyOutcome};
pub use registry::ResolverRegistry;
pub use resolvers::{
    builtin_resolvers, ContextResolver, DataResolver, MetricsResolver, StateResolver,
    TemporalResolver, TokenResolver,
};
pub use token_registry::TokenRegistry;
