//! Per-call resolution context.

use chrono::{DateTime, Utc};
use token_types::{AgentId, StepId, WorkflowId};

use crate::stores::StoreHandles;

/// Everything a resolver knows about the call it is serving.
///
/// Built per resolution request and shared read-only across the batch,
/// so every token in one template sees the same clock and the same
/// requesting agent.
#[derive(Clone)]
pub struct ResolverContext {
    /// Agent the resolution is attributed to
    pub agent_id: AgentId,
    /// Workflow the template belongs to, when known
    pub workflow_id: Option<WorkflowId>,
    /// Step within the workflow, when known
    pub step_id: Option<StepId>,
    /// Schema version the caller expects values to conform to
    pub schema_version: Option<String>,
    /// Wall-clock anchor; temporal values derive from this, not from
    /// repeated `Utc::now()` calls
    pub now: DateTime<Utc>,
    /// Injected stores the resolvers read from
    pub stores: StoreHandles,
}

impl ResolverContext {
    pub fn new(agent_id: AgentId, stores: StoreHandles) -> Self {
        Self {
            agent_id,
            workflow_id: None,
            step_id: None,
            schema_version: None,
            now: Utc::now(),
            stores,
        }
    }

    pub fn with_workflow(mut self, workflow_id: WorkflowId) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    pub fn with_step(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    /// Pin the clock, mainly for deterministic temporal tests.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}
