//! Partial state update returned by a stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fields a stage changes, and nothing else.
///
/// For an append field the value is the list of items to append: `push`
/// builds that list; a non-array value written with `set` is appended as a
/// single item.
///
/// **Interaction**: Returned by `Stage::run`; merged by the engine through
/// `PipelineState::merge`; emitted to callers inside `StepUpdate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    fields: BTreeMap<String, Value>,
}

impl StateUpdate {
    /// Empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `value` to `field`, replacing any earlier write in this update.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Writes a serializable value (e.g. a parsed verdict) to `field`.
    pub fn set_serialized<T: Serialize>(
        self,
        field: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(field, value))
    }

    /// Adds one item to the list this update appends to `field`.
    pub fn push(mut self, field: impl Into<String>, item: impl Into<Value>) -> Self {
        let item = item.into();
        match self.fields.entry(field.into()) {
            std::collections::btree_map::Entry::Occupied(mut e) => match e.get_mut() {
                Value::Array(items) => items.push(item),
                other => {
                    let prev = other.take();
                    *other = Value::Array(vec![prev, item]);
                }
            },
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(Value::Array(vec![item]));
            }
        }
        self
    }

    /// Adds every item of `items` to the list appended to `field`.
    pub fn extend<I, V>(self, field: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let field = field.into();
        items
            .into_iter()
            .fold(self, |update, item| update.push(field.clone(), item))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String value of `field`, if it is a string.
    pub fn str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Items this update appends to `field` (a scalar write counts as one item).
    pub fn items(&self, field: &str) -> Vec<&Value> {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(v) => vec![v],
            None => Vec::new(),
        }
    }
}
