//! Pipeline state: field map, partial updates and the per-field merge policy.
//!
//! `StateSchema` fixes each field's kind for a pipeline definition; the engine
//! merges every `StateUpdate` into `PipelineState` through it.

mod pipeline_state;
mod schema;
mod update;

pub use pipeline_state::PipelineState;
pub use schema::{FieldKind, StateSchema};
pub use update::StateUpdate;
