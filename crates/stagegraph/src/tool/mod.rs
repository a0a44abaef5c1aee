//! Tool trait and registry.
//!
//! - `Tool`: named function with a description and a parameter schema
//! - `FnTool`: tool backed by a closure over one string argument
//! - `ToolRegistry`: registration, listing and by-name execution
//! - `validate_args`: checks `required` keys before execution
//! - `ToolError`: see `crate::error::ToolError`

mod fn_tool;
mod registry;
mod validation;

pub use fn_tool::FnTool;
pub use registry::{ToolRegistry, ToolSpec};
pub use validation::validate_args;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;

/// A callable tool.
///
/// `parameters_schema` is a minimal JSON Schema
/// (`{"type":"object","properties":{...},"required":[...]}`) used for argument
/// validation and for describing the tool to an agent loop.
///
/// A lookup miss (unknown order id, no matching FAQ entry) is not an error:
/// return a user-facing "not found" text instead.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    /// Runs the tool with already validated arguments.
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}
