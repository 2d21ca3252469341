//! Host seams
//!
//! The interpreter performs no work itself. The host supplies a
//! [`StepRunner`] that executes one resolved [`Step`], plus optional hooks
//! with fixed signatures. Every seam returns [`anyhow::Result`]; host errors
//! abort the run and surface unchanged through [`PlanError::Host`](crate::PlanError::Host).

use crate::plan::Plan;
use crate::types::{Fields, State, Step, StepResult};
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Executes one resolved step
///
/// Implement this trait to define how a step is actually carried out (a
/// network fetch, a query, ...). Closures with the matching signature
/// implement it automatically.
pub trait StepRunner: Send + Sync {
    /// Run a single step with the host arguments given to `run`
    fn run_step(&self, step: &Step, args: &[Value]) -> anyhow::Result<StepResult>;
}

impl<F> StepRunner for F
where
    F: Fn(&Step, &[Value]) -> anyhow::Result<StepResult> + Send + Sync,
{
    fn run_step(&self, step: &Step, args: &[Value]) -> anyhow::Result<StepResult> {
        self(step, args)
    }
}

/// Rewrites a resolved step before execution
pub type InterpolateStepFn =
    Arc<dyn Fn(&mut Step, &State, &[Value]) -> anyhow::Result<()> + Send + Sync>;

/// Supplies a reference container by name, or `None` to fall back to state
pub type UnpackRefContainerFn =
    Arc<dyn Fn(&str, &[Value]) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// Observes or mutates a step result before fan-out
pub type PostStepFn = Arc<dyn Fn(&Step, &mut StepResult) -> anyhow::Result<()> + Send + Sync>;

/// Observes or mutates an integration target before the child payload lands
pub type MergeDownFn =
    Arc<dyn Fn(&mut Fields, &StepResult) -> anyhow::Result<()> + Send + Sync>;

/// Per-plan default computed from the data a child would be bound to
pub type DefaultFn =
    Arc<dyn Fn(&Plan, &Value, &[Value]) -> anyhow::Result<Option<StepResult>> + Send + Sync>;

/// Optional host hooks
#[derive(Clone, Default)]
pub struct Hooks {
    /// Add or rewrite fields of a resolved step
    pub interpolate_step: Option<InterpolateStepFn>,
    /// Override container lookup for references
    pub unpack_ref_container: Option<UnpackRefContainerFn>,
    /// Run after a step passes result validation, before fan-out
    pub post_step: Option<PostStepFn>,
    /// Run before each integration extracts the child's content
    pub merge_down_step: Option<MergeDownFn>,
}

impl Hooks {
    /// Create empty hook set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Debug for Hooks {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("interpolate_step", &self.interpolate_step.is_some())
            .field("unpack_ref_container", &self.unpack_ref_container.is_some())
            .field("post_step", &self.post_step.is_some())
            .field("merge_down_step", &self.merge_down_step.is_some())
            .finish()
    }
}
