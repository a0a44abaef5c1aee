//! Outgoing edge of a stage: fixed successor, fan-out group, revision gate, or router.

use std::fmt;
use std::sync::Arc;

use crate::state::PipelineState;

use super::gate::RevisionGate;

/// Virtual entry point; `add_edge(START, "planner")` sets the first stage.
pub const START: &str = "__start__";

/// Virtual exit; an edge to `END` (or a router returning it) finishes the run.
pub const END: &str = "__end__";

/// Data-dependent routing: inspects state, returns the next stage name (or `END`).
pub type RouteFn = Arc<dyn Fn(&PipelineState) -> String + Send + Sync>;

/// What runs after a stage.
///
/// A stage with no edge is terminal. Each variant names its possible targets
/// up front so `PipelineGraph::compile` can validate them.
///
/// **Interaction**: Stored per source stage by `PipelineGraph`; resolved by
/// `Execution` after the source stage's update has been merged.
#[derive(Clone)]
pub enum Edge {
    /// Single unconditional successor (may be `END`).
    Next(String),
    /// Branches run on the same snapshot; `join` runs once all are merged.
    FanOut { branches: Vec<String>, join: String },
    /// Score/budget gate choosing between rework and the terminal stage.
    Revision(RevisionGate),
    /// Arbitrary router restricted to `targets`.
    Route { targets: Vec<String>, route: RouteFn },
}

impl Edge {
    /// Every stage name this edge can lead to (excluding `END`).
    pub fn targets(&self) -> Vec<&str> {
        let all: Vec<&str> = match self {
            Edge::Next(to) => vec![to.as_str()],
            Edge::FanOut { branches, join } => branches
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(join.as_str()))
                .collect(),
            Edge::Revision(gate) => vec![gate.rework_stage(), gate.done_stage()],
            Edge::Route { targets, .. } => targets.iter().map(String::as_str).collect(),
        };
        all.into_iter().filter(|t| *t != END).collect()
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Next(to) => f.debug_tuple("Next").field(to).finish(),
            Edge::FanOut { branches, join } => f
                .debug_struct("FanOut")
                .field("branches", branches)
                .field("join", join)
                .finish(),
            Edge::Revision(gate) => f.debug_tuple("Revision").field(gate).finish(),
            Edge::Route { targets, .. } => f
                .debug_struct("Route")
                .field("targets", targets)
                .finish_non_exhaustive(),
        }
    }
}
