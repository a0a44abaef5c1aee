//! Field kinds for a pipeline definition.

use std::collections::BTreeMap;

/// How writes to a field are merged into the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Each write replaces the previous value.
    Scalar,
    /// Each write is appended to an ordered sequence.
    Append,
}

/// Declares the kind of every accumulating field of a pipeline.
///
/// Fields not declared here are scalar. The schema is moved into the compiled
/// pipeline, so a field's kind cannot change for the lifetime of the definition.
///
/// **Interaction**: Passed to `PipelineGraph::new`; consulted by
/// `PipelineState::merge` for every stage update.
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    fields: BTreeMap<String, FieldKind>,
}

impl StateSchema {
    /// Empty schema: every field is scalar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an accumulating field.
    pub fn append(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldKind::Append);
        self
    }

    /// Kind of `field`; `Scalar` when undeclared.
    pub fn kind(&self, field: &str) -> FieldKind {
        self.fields.get(field).copied().unwrap_or(FieldKind::Scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_fields_are_scalar() {
        let schema = StateSchema::new().append("progress");
        assert_eq!(schema.kind("progress"), FieldKind::Append);
        assert_eq!(schema.kind("draft"), FieldKind::Scalar);
    }
}
