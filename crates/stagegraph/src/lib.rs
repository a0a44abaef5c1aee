//! Revising pipelines in Rust: named stages, one merged state, review-gated rework.
//!
//! A pipeline is a set of [`Stage`]s wired by [`Edge`]s. Each stage reads a
//! snapshot of [`PipelineState`] and returns a partial [`StateUpdate`]; the
//! engine merges it according to the [`StateSchema`] (overwrite or append) and
//! emits `(stage, update)` to the caller before moving on.
//!
//! ## Main modules
//!
//! - [`graph`]: `PipelineGraph` builder, compiled `Pipeline`, `Execution`, edges and the `RevisionGate`.
//! - [`state`]: `PipelineState`, `StateUpdate`, `StateSchema`.
//! - [`structured`]: fenced-JSON extraction and parse-or-fallback.
//! - [`review`]: `ReviewVerdict` and the reusable `ReviewStage`.
//! - [`llm`]: `LlmClient` trait, the scripted `MockLlm` and (feature `openai`) `OpenAiClient`.
//! - [`tool`]: `Tool` trait, `FnTool`, `ToolRegistry`.
//! - [`memory`]: session-keyed `SessionHistory` and `InMemoryHistory`.
//! - [`chat`]: history-backed chat turns with streamed partial reasoning and answer.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use stagegraph::{stage_fn, PipelineGraph, PipelineState, StateSchema, StateUpdate, END, START};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let schema = StateSchema::new().append("progress");
//! let mut graph = PipelineGraph::new(schema);
//! graph
//!     .add_stage(stage_fn("draft", |_s| Ok(StateUpdate::new().set("draft", "hello").push("progress", "drafted"))))
//!     .add_edge(START, "draft")
//!     .add_edge("draft", END);
//! let pipeline = graph.compile().unwrap();
//! let out = pipeline.invoke(PipelineState::new()).await.unwrap();
//! assert_eq!(out.str("draft"), Some("hello"));
//! # }
//! ```

pub mod chat;
pub mod error;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod review;
pub mod state;
pub mod structured;
pub mod tool;

pub use chat::{ChatError, ChatPartial, HistoryChat};
pub use error::{PipelineError, RunError, StageError, ToolError};
pub use graph::{
    stage_fn, CompilationError, Edge, Execution, FnStage, GateOutcome, Pipeline, PipelineGraph,
    RevisionGate, RouteFn, Stage, StepUpdate, DEFAULT_MAX_STEPS, END, START,
};
pub use llm::{
    ChatMessage, DeltaStream, LlmClient, LlmError, MessageRole, MockLlm, RecordedRequest,
    StreamDelta, TextStream,
};
#[cfg(feature = "openai")]
pub use llm::{OpenAiClient, OpenAiConfig};
pub use memory::{HistoryError, InMemoryHistory, SessionHistory};
pub use review::{ReviewStage, ReviewVerdict, DEFAULT_REVIEW_FEEDBACK};
pub use state::{FieldKind, PipelineState, StateSchema, StateUpdate};
pub use structured::{extract_json, parse_or_fallback, parse_structured, Parsed};
pub use tool::{validate_args, FnTool, Tool, ToolRegistry, ToolSpec};
