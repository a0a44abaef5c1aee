//! Compiled pipeline: immutable, supports invoke, stream and step-by-step runs.
//!
//! Built by `PipelineGraph::compile`. One `Pipeline` can serve many runs
//! concurrently; each run owns its own `PipelineState`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, Stream};
use serde::Serialize;
use tracing::info;

use crate::error::RunError;
use crate::state::{PipelineState, StateSchema, StateUpdate};

use super::edge::Edge;
use super::execution::Execution;
use super::stage::Stage;

/// One progress event: the stage that just ran and the update it returned.
///
/// The update has already been merged when the event is emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepUpdate {
    pub stage: String,
    pub update: StateUpdate,
}

/// Compiled graph: immutable structure shared by all runs.
///
/// Created by `PipelineGraph::compile()`. Runs start at the entry stage and
/// follow each stage's edge until a terminal stage or `END`.
///
/// **Interaction**: Built from `PipelineGraph`; callers use `invoke`, `stream`
/// or `start` to execute.
pub struct Pipeline {
    pub(super) schema: StateSchema,
    pub(super) stages: HashMap<String, Arc<dyn Stage>>,
    pub(super) entry: String,
    pub(super) edges: HashMap<String, Edge>,
    pub(super) max_steps: usize,
}

impl Pipeline {
    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Starts a run without executing anything; drive it with `Execution::next_step`.
    pub fn start(&self, initial: PipelineState) -> Execution<'_> {
        Execution::new(self, initial)
    }

    /// Runs to completion and returns the final state.
    ///
    /// On a fatal stage error the returned `RunError` carries the state merged
    /// so far; no later stage has run.
    pub async fn invoke(&self, initial: PipelineState) -> Result<PipelineState, RunError> {
        let mut run = self.start(initial);
        while let Some(step) = run.next_step().await {
            step?;
        }
        info!(steps = run.steps(), "pipeline finished");
        Ok(run.into_state())
    }

    /// Runs lazily, yielding one `StepUpdate` per executed stage in execution
    /// order. A failure is yielded as the last item.
    pub fn stream(
        &self,
        initial: PipelineState,
    ) -> impl Stream<Item = Result<StepUpdate, RunError>> + Send + '_ {
        stream::unfold(self.start(initial), |mut run| async move {
            run.next_step().await.map(|item| (item, run))
        })
    }

    pub(super) fn stage(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(name).cloned()
    }

    pub(super) fn edge(&self, from: &str) -> Option<&Edge> {
        self.edges.get(from)
    }
}
