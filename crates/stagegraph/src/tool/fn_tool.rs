//! Closure-backed tool over a single string argument.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;

use super::Tool;

/// Tool wrapping `Fn(&str) -> String`.
///
/// Most lookup tools (order status, logistics, FAQ, web search) take one
/// string and return text; this saves a struct per tool.
pub struct FnTool<F> {
    name: String,
    description: String,
    param: String,
    f: F,
}

impl<F> FnTool<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    /// `param` is the name of the single required string argument.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        param: impl Into<String>,
        f: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param: param.into(),
            f,
        }
    }

    /// Calls the closure directly, bypassing the registry.
    pub fn invoke(&self, input: &str) -> String {
        (self.f)(input)
    }
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { self.param.as_str(): { "type": "string" } },
            "required": [self.param]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let input = args
            .get(&self.param)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ToolError::ValidationFailed(format!("'{}' must be a string", self.param))
            })?;
        Ok(Value::String((self.f)(input)))
    }
}
