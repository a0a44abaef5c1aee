//! The accumulating record threaded through one pipeline run.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::{FieldKind, StateSchema};
use super::update::StateUpdate;

/// Field name → JSON value, owned by exactly one run.
///
/// Built from a seed (user input plus zeroed counters) with `with`, then only
/// changed by the engine through `merge`. Stages see it read-only.
///
/// **Interaction**: Created by callers; threaded through `Execution`; returned
/// by `Pipeline::invoke` or inside `RunError` when a run aborts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    fields: BTreeMap<String, Value>,
}

impl PipelineState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `field` with `value` (builder).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Deserializes `field` into `T`; `None` when absent or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Option<T> {
        self.fields
            .get(field)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Non-empty string value of `field`.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.str(field).filter(|s| !s.trim().is_empty())
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    pub fn flag(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    /// Items of a list field; empty when absent or not a list.
    pub fn list(&self, field: &str) -> &[Value] {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// String items of a list field, skipping non-strings.
    pub fn strings(&self, field: &str) -> Vec<String> {
        self.list(field)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Applies `update` field by field: scalar fields are overwritten, append
    /// fields are extended in the order the update lists its items.
    pub fn merge(&mut self, schema: &StateSchema, update: &StateUpdate) {
        for (field, value) in update.iter() {
            match schema.kind(field) {
                FieldKind::Scalar => {
                    self.fields.insert(field.to_string(), value.clone());
                }
                FieldKind::Append => {
                    let slot = self
                        .fields
                        .entry(field.to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        // A seed wrote a bare value; keep it as the first item.
                        let prev = slot.take();
                        *slot = Value::Array(vec![prev]);
                    }
                    if let Value::Array(items) = slot {
                        match value {
                            Value::Array(new_items) => items.extend(new_items.iter().cloned()),
                            other => items.push(other.clone()),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::new().append("progress")
    }

    #[test]
    fn scalar_field_is_overwritten() {
        let mut state = PipelineState::new().with("draft", "v1");
        state.merge(&schema(), &StateUpdate::new().set("draft", "v2"));
        assert_eq!(state.str("draft"), Some("v2"));
    }

    #[test]
    fn append_field_concatenates_in_order() {
        let mut state = PipelineState::new();
        state.merge(&schema(), &StateUpdate::new().push("progress", "a"));
        state.merge(
            &schema(),
            &StateUpdate::new().push("progress", "b").push("progress", "c"),
        );
        assert_eq!(state.get("progress"), Some(&json!(["a", "b", "c"])));
    }

    #[test]
    fn append_field_accepts_bare_value_as_one_item() {
        let mut state = PipelineState::new();
        state.merge(&schema(), &StateUpdate::new().set("progress", "only"));
        assert_eq!(state.strings("progress"), vec!["only".to_string()]);
    }

    #[test]
    fn append_onto_seeded_bare_value_keeps_seed_first() {
        let mut state = PipelineState::new().with("progress", "seed");
        state.merge(&schema(), &StateUpdate::new().push("progress", "next"));
        assert_eq!(state.strings("progress"), vec!["seed", "next"]);
    }

    #[test]
    fn untouched_fields_survive_merge() {
        let mut state = PipelineState::new().with("topic", "rust").with("revision_count", 0);
        state.merge(&schema(), &StateUpdate::new().set("revision_count", 1));
        assert_eq!(state.str("topic"), Some("rust"));
        assert_eq!(state.int("revision_count"), Some(1));
    }

    #[test]
    fn typed_accessors() {
        let state = PipelineState::new()
            .with("score", 7.5)
            .with("passed", true)
            .with("questions", json!(["q1", "q2"]))
            .with("blank", "  ");
        assert_eq!(state.number("score"), Some(7.5));
        assert_eq!(state.flag("passed"), Some(true));
        assert_eq!(state.get_as::<Vec<String>>("questions").unwrap().len(), 2);
        assert_eq!(state.text("blank"), None);
        assert!(state.list("missing").is_empty());
    }
}
