//! Tool registry: register, list, execute by name.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ToolError;

use super::validation::validate_args;
use super::Tool;

/// Name, description and parameter schema of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tools by name.
///
/// **Interaction**: Built by the caller and handed to stages that run tools
/// (research, customer support); `execute` validates arguments first.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tool`, replacing any tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> &mut Self {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Specs of all tools, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Validates `args` against the tool's schema, then executes it.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        validate_args(&tool.parameters_schema(), &args)?;
        debug!(tool = name, "executing tool");
        tool.execute(args).await
    }

    /// `execute` for tools that return text; non-string results are rendered as JSON.
    pub async fn execute_text(&self, name: &str, args: Value) -> Result<String, ToolError> {
        Ok(match self.execute(name, args).await? {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::FnTool;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(FnTool::new("web_search", "Searches the web", "query", |q: &str| {
            format!("results for {q}")
        }))
        .register(FnTool::new("order_status", "Looks up an order", "order_id", |id: &str| {
            format!("order {id}: shipped")
        }));
        reg
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let out = registry()
            .execute_text("web_search", json!({"query": "rust"}))
            .await
            .unwrap();
        assert_eq!(out, "results for rust");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let err = registry().execute("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref n) if n == "nope"));
    }

    #[tokio::test]
    async fn missing_argument_fails_validation() {
        let err = registry()
            .execute("order_status", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ValidationFailed(ref m) if m.contains("order_id")));
    }

    #[test]
    fn specs_sorted_by_name() {
        let names: Vec<_> = registry().specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["order_status", "web_search"]);
    }
}
