//! Stage trait: one named unit of work in a pipeline.
//!
//! A stage receives a read-only snapshot of the state and returns only the
//! fields it changes. Routing lives on edges, never in the stage.

use async_trait::async_trait;

use crate::error::StageError;
use crate::state::{PipelineState, StateUpdate};

/// One step in a pipeline: state snapshot in, partial update out.
///
/// Returning `Err` aborts the run. Stages that depend on structured generator
/// output substitute a documented fallback instead of failing (see
/// `crate::structured`).
///
/// **Interaction**: Registered with `PipelineGraph::add_stage`; invoked by
/// `Execution::next_step`, which merges the returned update.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name; unique within a pipeline.
    fn name(&self) -> &str;

    /// Produces this stage's update from the current state.
    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError>;
}

/// Stage backed by a synchronous closure.
///
/// Handy for stages that only reshape state (e.g. a publish step).
pub struct FnStage<F> {
    name: String,
    f: F,
}

/// Builds a `FnStage` named `name` around `f`.
pub fn stage_fn<F>(name: impl Into<String>, f: F) -> FnStage<F>
where
    F: Fn(&PipelineState) -> Result<StateUpdate, StageError> + Send + Sync,
{
    FnStage {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&PipelineState) -> Result<StateUpdate, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        (self.f)(state)
    }
}
