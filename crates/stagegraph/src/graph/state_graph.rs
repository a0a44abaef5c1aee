//! Pipeline graph builder: stages + tagged edges.
//!
//! Add stages with `add_stage`, wire them with `add_edge`, `add_fan_out`,
//! `add_revision_gate` or `add_conditional_edge`, then `compile` to get an
//! immutable `Pipeline`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::graph::compile_error::CompilationError;
use crate::graph::compiled::Pipeline;
use crate::graph::edge::{Edge, END, START};
use crate::graph::gate::RevisionGate;
use crate::graph::stage::Stage;
use crate::state::{PipelineState, StateSchema};

/// Upper bound on stage executions per run unless overridden.
pub const DEFAULT_MAX_STEPS: usize = 32;

/// Mutable pipeline definition.
///
/// Wiring mistakes (unknown stage names, two edges out of one stage, a missing
/// entry) are collected while building and reported by `compile`, so the
/// builder methods can chain without `?`.
///
/// **Interaction**: Accepts any `Stage`; produces a `Pipeline`.
pub struct PipelineGraph {
    schema: StateSchema,
    stages: HashMap<String, Arc<dyn Stage>>,
    entry: Option<String>,
    edges: HashMap<String, Edge>,
    duplicates: Vec<String>,
    conflicts: Vec<String>,
    max_steps: usize,
}

impl PipelineGraph {
    /// Empty graph merging updates according to `schema`.
    pub fn new(schema: StateSchema) -> Self {
        Self {
            schema,
            stages: HashMap::new(),
            entry: None,
            edges: HashMap::new(),
            duplicates: Vec::new(),
            conflicts: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Overrides the per-run stage execution limit.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Registers a stage under its own name.
    pub fn add_stage<T: Stage + 'static>(&mut self, stage: T) -> &mut Self {
        self.add_shared_stage(Arc::new(stage))
    }

    /// Registers an already shared stage.
    pub fn add_shared_stage(&mut self, stage: Arc<dyn Stage>) -> &mut Self {
        let name = stage.name().to_string();
        if self.stages.insert(name.clone(), stage).is_some() {
            self.duplicates.push(name);
        }
        self
    }

    /// Unconditional edge. `from == START` sets the entry stage; `to == END`
    /// makes `from` terminal.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        let (from, to) = (from.into(), to.into());
        if from == START {
            if self.entry.replace(to).is_some() {
                self.conflicts.push(START.to_string());
            }
            return self;
        }
        self.insert_edge(from, Edge::Next(to))
    }

    /// Runs every branch on the same snapshot after `from`, merges their
    /// updates in declaration order, then continues with `join`.
    pub fn add_fan_out<I, B>(
        &mut self,
        from: impl Into<String>,
        branches: I,
        join: impl Into<String>,
    ) -> &mut Self
    where
        I: IntoIterator<Item = B>,
        B: Into<String>,
    {
        let from = from.into();
        let branches: Vec<String> = branches.into_iter().map(Into::into).collect();
        self.insert_edge(
            from,
            Edge::FanOut {
                branches,
                join: join.into(),
            },
        )
    }

    /// Review loop: after `from`, `gate` picks the rework or terminal stage.
    pub fn add_revision_gate(&mut self, from: impl Into<String>, gate: RevisionGate) -> &mut Self {
        self.insert_edge(from.into(), Edge::Revision(gate))
    }

    /// Data-dependent edge. `route` must return one of `targets` or `END`.
    pub fn add_conditional_edge<I, T, F>(
        &mut self,
        from: impl Into<String>,
        targets: I,
        route: F,
    ) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
        F: Fn(&PipelineState) -> String + Send + Sync + 'static,
    {
        let edge = Edge::Route {
            targets: targets.into_iter().map(Into::into).collect(),
            route: Arc::new(route),
        };
        self.insert_edge(from.into(), edge)
    }

    fn insert_edge(&mut self, from: String, edge: Edge) -> &mut Self {
        if self.edges.insert(from.clone(), edge).is_some() {
            self.conflicts.push(from);
        }
        self
    }

    /// Validates the wiring and freezes the graph.
    ///
    /// Checks, in order: duplicate stage names, conflicting edges, the entry
    /// edge, fan-out groups, and that every edge source and target is a
    /// registered stage.
    pub fn compile(self) -> Result<Pipeline, CompilationError> {
        if let Some(name) = self.duplicates.first() {
            return Err(CompilationError::DuplicateStage(name.clone()));
        }
        if let Some(from) = self.conflicts.first() {
            return Err(CompilationError::ConflictingEdge(from.clone()));
        }
        let entry = self.entry.clone().ok_or(CompilationError::MissingEntry)?;
        if !self.stages.contains_key(&entry) {
            return Err(CompilationError::StageNotFound(entry));
        }

        let mut sources: Vec<&String> = self.edges.keys().collect();
        sources.sort();
        for from in sources {
            if !self.stages.contains_key(from) {
                return Err(CompilationError::StageNotFound(from.clone()));
            }
            let edge = &self.edges[from];
            if let Edge::FanOut { branches, .. } = edge {
                if branches.is_empty() {
                    return Err(CompilationError::EmptyFanOut(from.clone()));
                }
                if let Some(b) = branches.iter().find(|b| self.edges.contains_key(*b)) {
                    return Err(CompilationError::BranchHasEdge(b.clone()));
                }
            }
            if let Some(missing) = edge.targets().into_iter().find(|t| !self.stages.contains_key(*t)) {
                return Err(CompilationError::StageNotFound(missing.to_string()));
            }
        }

        Ok(Pipeline {
            schema: self.schema,
            stages: self.stages,
            entry,
            edges: self.edges,
            max_steps: self.max_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::stage::stage_fn;
    use crate::state::StateUpdate;

    fn noop(name: &str) -> impl Stage {
        stage_fn(name.to_string(), |_: &PipelineState| Ok(StateUpdate::new()))
    }

    fn graph() -> PipelineGraph {
        PipelineGraph::new(StateSchema::new())
    }

    #[test]
    fn compile_requires_entry() {
        let mut g = graph();
        g.add_stage(noop("a"));
        assert_eq!(g.compile().err(), Some(CompilationError::MissingEntry));
    }

    #[test]
    fn compile_rejects_unknown_target() {
        let mut g = graph();
        g.add_stage(noop("a")).add_edge(START, "a").add_edge("a", "b");
        assert_eq!(
            g.compile().err(),
            Some(CompilationError::StageNotFound("b".into()))
        );
    }

    #[test]
    fn compile_rejects_duplicate_stage() {
        let mut g = graph();
        g.add_stage(noop("a")).add_stage(noop("a")).add_edge(START, "a");
        assert_eq!(
            g.compile().err(),
            Some(CompilationError::DuplicateStage("a".into()))
        );
    }

    #[test]
    fn compile_rejects_two_edges_from_one_stage() {
        let mut g = graph();
        g.add_stage(noop("a"))
            .add_stage(noop("b"))
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("a", END);
        assert_eq!(
            g.compile().err(),
            Some(CompilationError::ConflictingEdge("a".into()))
        );
    }

    #[test]
    fn compile_rejects_branch_with_own_edge() {
        let mut g = graph();
        for n in ["a", "x", "y", "j"] {
            g.add_stage(noop(n));
        }
        g.add_edge(START, "a")
            .add_fan_out("a", ["x", "y"], "j")
            .add_edge("x", "j");
        assert_eq!(
            g.compile().err(),
            Some(CompilationError::BranchHasEdge("x".into()))
        );
    }

    #[test]
    fn compile_rejects_gate_to_unknown_stage() {
        let mut g = graph();
        g.add_stage(noop("review"))
            .add_edge(START, "review")
            .add_revision_gate("review", RevisionGate::new("writer", END));
        assert_eq!(
            g.compile().err(),
            Some(CompilationError::StageNotFound("writer".into()))
        );
    }

    #[test]
    fn compile_accepts_linear_chain() {
        let mut g = graph();
        g.add_stage(noop("a"))
            .add_stage(noop("b"))
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("b", END);
        assert!(g.compile().is_ok());
    }
}
