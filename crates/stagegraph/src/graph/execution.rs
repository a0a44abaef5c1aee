//! One pipeline run, advanced a stage (or a fan-out group) at a time.

use std::collections::VecDeque;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, RunError};
use crate::state::PipelineState;

use super::compiled::{Pipeline, StepUpdate};
use super::edge::{Edge, END, START};

enum Cursor {
    Stage(String),
    FanOut { branches: Vec<String>, join: String },
    Failed(PipelineError),
    Done,
}

/// State of a single run.
///
/// Each `next_step` executes at most one stage (or one fan-out group), merges
/// the result, resolves the outgoing edge and returns the stage's update.
/// After an error or the last stage it returns `None`.
///
/// **Interaction**: Created by `Pipeline::start`; driven by `Pipeline::invoke`
/// and `Pipeline::stream`, or directly by callers that render progress.
pub struct Execution<'a> {
    pipeline: &'a Pipeline,
    state: PipelineState,
    cursor: Cursor,
    pending: VecDeque<StepUpdate>,
    previous: String,
    steps: usize,
}

impl<'a> Execution<'a> {
    pub(super) fn new(pipeline: &'a Pipeline, initial: PipelineState) -> Self {
        Self {
            pipeline,
            state: initial,
            cursor: Cursor::Stage(pipeline.entry.clone()),
            pending: VecDeque::new(),
            previous: START.to_string(),
            steps: 0,
        }
    }

    /// State merged so far.
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn into_state(self) -> PipelineState {
        self.state
    }

    /// Number of stage executions so far (fan-out branches count individually).
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Stage whose update was merged last (`START` before the first step).
    /// After a fan-out this is the last branch in declaration order.
    pub fn last_merged(&self) -> &str {
        &self.previous
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && matches!(self.cursor, Cursor::Done)
    }

    /// Executes the next stage and returns its update, or `None` when the run is over.
    pub async fn next_step(&mut self) -> Option<Result<StepUpdate, RunError>> {
        if let Some(step) = self.pending.pop_front() {
            return Some(Ok(step));
        }
        match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => None,
            Cursor::Failed(error) => Some(Err(self.abort(error))),
            Cursor::Stage(name) => Some(self.run_stage(name).await),
            Cursor::FanOut { branches, join } => Some(self.run_fan_out(branches, join).await),
        }
    }

    async fn run_stage(&mut self, name: String) -> Result<StepUpdate, RunError> {
        self.reserve(1)?;
        let stage = self.pipeline.stage(&name).ok_or_else(|| {
            self.abort(PipelineError::UnknownRoute {
                from: self.previous.clone(),
                target: name.clone(),
            })
        })?;

        info!(stage = %name, step = self.steps, "stage started");
        let update = match stage.run(&self.state).await {
            Ok(update) => update,
            Err(source) => {
                warn!(stage = %name, error = %source, "stage failed");
                return Err(self.abort(PipelineError::StageFailed {
                    stage: name,
                    source,
                }));
            }
        };
        self.state.merge(&self.pipeline.schema, &update);
        debug!(stage = %name, fields = ?update.iter().map(|(k, _)| k).collect::<Vec<_>>(), "update merged");

        self.cursor = self.follow(&name);
        self.previous = name.clone();
        Ok(StepUpdate {
            stage: name,
            update,
        })
    }

    /// Branches share one snapshot; their updates are merged in declaration
    /// order and queued so each is emitted as its own step.
    async fn run_fan_out(
        &mut self,
        branches: Vec<String>,
        join: String,
    ) -> Result<StepUpdate, RunError> {
        self.reserve(branches.len())?;
        let mut stages = Vec::with_capacity(branches.len());
        for name in &branches {
            match self.pipeline.stage(name) {
                Some(stage) => stages.push(stage),
                None => {
                    return Err(self.abort(PipelineError::UnknownRoute {
                        from: self.previous.clone(),
                        target: name.clone(),
                    }))
                }
            }
        }

        info!(branches = ?branches, join = %join, "fan-out started");
        let snapshot = self.state.clone();
        let results = join_all(stages.iter().map(|s| s.run(&snapshot))).await;

        let mut updates = Vec::with_capacity(results.len());
        for (name, result) in branches.into_iter().zip(results) {
            match result {
                Ok(update) => updates.push(StepUpdate { stage: name, update }),
                Err(source) => {
                    warn!(stage = %name, error = %source, "fan-out branch failed");
                    return Err(self.abort(PipelineError::StageFailed {
                        stage: name,
                        source,
                    }));
                }
            }
        }
        // All branches succeeded; merge in declaration order.
        if let Some(last) = updates.last() {
            self.previous = last.stage.clone();
        }
        for step in updates {
            self.state.merge(&self.pipeline.schema, &step.update);
            self.pending.push_back(step);
        }

        self.cursor = if join == END {
            Cursor::Done
        } else {
            Cursor::Stage(join)
        };
        match self.pending.pop_front() {
            Some(step) => Ok(step),
            None => Err(self.abort(PipelineError::StepLimitExceeded(self.pipeline.max_steps))),
        }
    }

    fn reserve(&mut self, count: usize) -> Result<(), RunError> {
        if self.steps + count > self.pipeline.max_steps {
            warn!(max_steps = self.pipeline.max_steps, "step limit exceeded");
            return Err(self.abort(PipelineError::StepLimitExceeded(self.pipeline.max_steps)));
        }
        self.steps += count;
        Ok(())
    }

    /// Resolves the edge out of `from` against the freshly merged state.
    fn follow(&self, from: &str) -> Cursor {
        let target = match self.pipeline.edge(from) {
            None => return Cursor::Done,
            Some(Edge::Next(to)) => to.clone(),
            Some(Edge::FanOut { branches, join }) => {
                return Cursor::FanOut {
                    branches: branches.clone(),
                    join: join.clone(),
                }
            }
            Some(Edge::Revision(gate)) => gate.decide(&self.state).to_string(),
            Some(Edge::Route { targets, route }) => {
                let target = route(&self.state);
                if target != END && !targets.contains(&target) {
                    warn!(from, target = %target, "route returned undeclared stage");
                    return Cursor::Failed(PipelineError::UnknownRoute {
                        from: from.to_string(),
                        target,
                    });
                }
                target
            }
        };
        debug!(from, to = %target, "edge resolved");
        if target == END {
            Cursor::Done
        } else {
            Cursor::Stage(target)
        }
    }

    fn abort(&mut self, error: PipelineError) -> RunError {
        self.cursor = Cursor::Done;
        RunError {
            error,
            state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::graph::gate::RevisionGate;
    use crate::graph::stage::stage_fn;
    use crate::graph::state_graph::PipelineGraph;
    use crate::state::{StateSchema, StateUpdate};

    /// writer bumps the counter; reviewer always scores 5.
    fn review_loop(max_revisions: u32) -> Pipeline {
        let mut g = PipelineGraph::new(StateSchema::new().append("progress"));
        g.add_stage(stage_fn("writer", |s: &PipelineState| {
            let rc = s.int("revision_count").unwrap_or(0) + 1;
            Ok(StateUpdate::new()
                .set("revision_count", rc)
                .push("progress", format!("draft {rc}")))
        }))
        .add_stage(stage_fn("reviewer", |_: &PipelineState| {
            Ok(StateUpdate::new().set("review_score", 5))
        }))
        .add_stage(stage_fn("publish", |_: &PipelineState| {
            Ok(StateUpdate::new().set("final_report", "done"))
        }))
        .add_edge(START, "writer")
        .add_edge("writer", "reviewer")
        .add_revision_gate(
            "reviewer",
            RevisionGate::new("writer", "publish").with_max_revisions(max_revisions),
        )
        .add_edge("publish", END);
        g.compile().unwrap()
    }

    #[tokio::test]
    async fn revision_loop_is_bounded() {
        let pipeline = review_loop(3);
        let mut run = pipeline.start(PipelineState::new().with("revision_count", 0));
        let mut names = Vec::new();
        while let Some(step) = run.next_step().await {
            names.push(step.unwrap().stage);
        }
        assert!(run.is_finished());
        assert_eq!(
            names,
            vec!["writer", "reviewer", "writer", "reviewer", "writer", "reviewer", "publish"]
        );
        assert_eq!(run.state().int("revision_count"), Some(3));
        assert_eq!(run.state().str("final_report"), Some("done"));
    }

    #[tokio::test]
    async fn step_limit_stops_runaway_route() {
        let mut g = PipelineGraph::new(StateSchema::new()).with_max_steps(5);
        g.add_stage(stage_fn("spin", |_: &PipelineState| Ok(StateUpdate::new())))
            .add_edge(START, "spin")
            .add_conditional_edge("spin", ["spin"], |_| "spin".to_string());
        let err = g
            .compile()
            .unwrap()
            .invoke(PipelineState::new())
            .await
            .unwrap_err();
        assert!(matches!(err.error, PipelineError::StepLimitExceeded(5)));
    }

    #[tokio::test]
    async fn undeclared_route_target_is_an_error() {
        let mut g = PipelineGraph::new(StateSchema::new());
        g.add_stage(stage_fn("router", |_: &PipelineState| Ok(StateUpdate::new())))
            .add_stage(stage_fn("faq", |_: &PipelineState| Ok(StateUpdate::new())))
            .add_edge(START, "router")
            .add_conditional_edge("router", ["faq"], |_| "billing".to_string());
        let pipeline = g.compile().unwrap();
        let mut run = pipeline.start(PipelineState::new());
        assert_eq!(run.next_step().await.unwrap().unwrap().stage, "router");
        let err = run.next_step().await.unwrap().unwrap_err();
        assert!(
            matches!(err.error, PipelineError::UnknownRoute { ref target, .. } if target == "billing")
        );
        assert!(run.next_step().await.is_none());
    }

    #[tokio::test]
    async fn fan_out_merges_in_declaration_order() {
        let mut g = PipelineGraph::new(StateSchema::new().append("progress"));
        g.add_stage(stage_fn("creator", |_: &PipelineState| {
            Ok(StateUpdate::new().set("draft", "d"))
        }))
        .add_stage(stage_fn("fact_checker", |s: &PipelineState| {
            assert!(s.get("seo").is_none());
            Ok(StateUpdate::new()
                .set("fact_check", "ok")
                .push("progress", "fact"))
        }))
        .add_stage(stage_fn("seo_optimizer", |s: &PipelineState| {
            assert!(s.get("fact_check").is_none());
            Ok(StateUpdate::new().set("seo", "ok").push("progress", "seo"))
        }))
        .add_stage(stage_fn("editor", |s: &PipelineState| {
            let both = s.str("fact_check").is_some() && s.str("seo").is_some();
            Ok(StateUpdate::new().set("joined", both))
        }))
        .add_edge(START, "creator")
        .add_fan_out("creator", ["fact_checker", "seo_optimizer"], "editor")
        .add_edge("editor", END);

        let pipeline = g.compile().unwrap();
        let mut run = pipeline.start(PipelineState::new());
        let mut names = Vec::new();
        while let Some(step) = run.next_step().await {
            names.push(step.unwrap().stage);
        }
        assert_eq!(names, vec!["creator", "fact_checker", "seo_optimizer", "editor"]);
        assert_eq!(run.last_merged(), "editor");
        assert_eq!(run.state().flag("joined"), Some(true));
        assert_eq!(run.state().strings("progress"), vec!["fact", "seo"]);
        assert_eq!(run.steps(), 4);
    }

    #[tokio::test]
    async fn failed_branch_aborts_before_join() {
        let mut g = PipelineGraph::new(StateSchema::new());
        g.add_stage(stage_fn("creator", |_: &PipelineState| Ok(StateUpdate::new())))
            .add_stage(stage_fn("a", |_: &PipelineState| {
                Ok(StateUpdate::new().set("a", 1))
            }))
            .add_stage(stage_fn("b", |_: &PipelineState| {
                Err(StageError::Failed("boom".into()))
            }))
            .add_stage(stage_fn("join", |_: &PipelineState| {
                Ok(StateUpdate::new().set("joined", true))
            }))
            .add_edge(START, "creator")
            .add_fan_out("creator", ["a", "b"], "join");
        let err = g
            .compile()
            .unwrap()
            .invoke(PipelineState::new())
            .await
            .unwrap_err();
        assert!(matches!(err.error, PipelineError::StageFailed { ref stage, .. } if stage == "b"));
        assert!(!err.state.contains("a"));
        assert!(!err.state.contains("joined"));
    }

    #[tokio::test]
    async fn join_route_reports_join_after_fan_out() {
        let mut g = PipelineGraph::new(StateSchema::new());
        g.add_stage(stage_fn("creator", |_: &PipelineState| Ok(StateUpdate::new())))
            .add_stage(stage_fn("a", |_: &PipelineState| Ok(StateUpdate::new())))
            .add_stage(stage_fn("b", |_: &PipelineState| Ok(StateUpdate::new())))
            .add_stage(stage_fn("join", |_: &PipelineState| Ok(StateUpdate::new())))
            .add_edge(START, "creator")
            .add_fan_out("creator", ["a", "b"], "join")
            .add_conditional_edge("join", ["a"], |_| "missing".to_string());
        let pipeline = g.compile().unwrap();
        let mut run = pipeline.start(PipelineState::new());

        assert_eq!(run.next_step().await.unwrap().unwrap().stage, "creator");
        assert_eq!(run.next_step().await.unwrap().unwrap().stage, "a");
        assert_eq!(run.last_merged(), "b");
        assert_eq!(run.next_step().await.unwrap().unwrap().stage, "b");
        assert_eq!(run.last_merged(), "b");
        assert_eq!(run.next_step().await.unwrap().unwrap().stage, "join");
        let err = run.next_step().await.unwrap().unwrap_err();
        assert!(matches!(
            err.error,
            PipelineError::UnknownRoute { ref from, ref target } if from == "join" && target == "missing"
        ));
    }
}
