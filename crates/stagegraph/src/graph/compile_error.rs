//! Graph compilation error.
//!
//! Returned by `PipelineGraph::compile` when the wiring is inconsistent.

use thiserror::Error;

/// Error when compiling a pipeline graph.
///
/// Validation checks stage names, the entry edge, and every target named by an
/// edge before any run can start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompilationError {
    /// An edge names a stage that was not registered via `add_stage`.
    #[error("stage not found: {0}")]
    StageNotFound(String),

    /// Two stages were registered with the same name.
    #[error("duplicate stage: {0}")]
    DuplicateStage(String),

    /// No `add_edge(START, ..)` was given.
    #[error("no entry stage: add an edge from START")]
    MissingEntry,

    /// A stage was given more than one outgoing edge.
    #[error("stage '{0}' has more than one outgoing edge")]
    ConflictingEdge(String),

    /// A fan-out branch also declares its own outgoing edge; branches always flow to the join.
    #[error("fan-out branch '{0}' must not declare its own edge")]
    BranchHasEdge(String),

    /// A fan-out group with no branches.
    #[error("fan-out from '{0}' has no branches")]
    EmptyFanOut(String),
}
