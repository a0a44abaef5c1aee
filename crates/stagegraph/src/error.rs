//! Stage, run and tool error types.
//!
//! - `StageError`: a stage could not produce its update (fatal for the run)
//! - `PipelineError`: why the engine stopped a run early
//! - `RunError`: `PipelineError` plus the state accumulated before the abort
//! - `ToolError`: tool lookup, argument validation and execution failures

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::HistoryError;
use crate::state::PipelineState;

/// Fatal failure of a single stage.
///
/// Recoverable problems (unparseable structured output, lookup misses) are
/// handled inside the stage and never become a `StageError`.
#[derive(Debug, Error)]
pub enum StageError {
    /// The generation service failed or is unavailable.
    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    /// A tool invocation failed for a reason other than a lookup miss.
    #[error("tool failed: {0}")]
    Tool(#[from] ToolError),

    /// The session history store failed.
    #[error("history: {0}")]
    History(#[from] HistoryError),

    /// A field the stage depends on is absent from the state.
    #[error("missing input field: {0}")]
    MissingField(String),

    /// Any other unrecoverable fault.
    #[error("stage failed: {0}")]
    Failed(String),
}

/// Why a pipeline run was aborted.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage returned a fatal error; no later stage was executed.
    #[error("stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: StageError,
    },

    /// A conditional edge returned a stage name outside its declared targets.
    #[error("route from '{from}' returned unknown stage '{target}'")]
    UnknownRoute { from: String, target: String },

    /// The run executed more stages than the pipeline's step limit.
    #[error("step limit exceeded: {0}")]
    StepLimitExceeded(usize),
}

/// A failed run: the error plus whatever state had been merged before it.
///
/// Returned by `Pipeline::invoke` and yielded by `Pipeline::stream`. The
/// partial state is for diagnostics; it is not a final result.
#[derive(Debug, Error)]
#[error("pipeline run aborted: {error}")]
pub struct RunError {
    #[source]
    pub error: PipelineError,
    pub state: PipelineState,
}

/// Argument validation failure, converted to `ToolError::ValidationFailed`.
#[derive(Debug, Error, Clone)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

/// Tool lookup, validation and execution errors.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool registered under that name.
    #[error("tool not found: {0}")]
    NotFound(String),
    /// Arguments did not satisfy the tool's schema.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// The tool ran and failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl From<ValidationError> for ToolError {
    fn from(e: ValidationError) -> Self {
        ToolError::ValidationFailed(e.0)
    }
}
