//! Pipeline graph: stages + tagged edges, compile, then run or stream.
//!
//! Build with `PipelineGraph` (`add_stage`, `add_edge`, `add_fan_out`,
//! `add_revision_gate`, `add_conditional_edge`), `compile` into a `Pipeline`,
//! then `invoke`, `stream` or drive an `Execution` step by step.

mod compile_error;
mod compiled;
mod edge;
mod execution;
mod gate;
mod stage;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::{Pipeline, StepUpdate};
pub use edge::{Edge, RouteFn, END, START};
pub use execution::Execution;
pub use gate::{GateOutcome, RevisionGate};
pub use stage::{stage_fn, FnStage, Stage};
pub use state_graph::{PipelineGraph, DEFAULT_MAX_STEPS};
