//! Revision gate: the router behind review-and-rework loops.
//!
//! Reads a quality score and a revision counter from state. Below threshold
//! with budget left → rework stage; otherwise → terminal stage. The budget
//! check guarantees the loop ends even when the score never passes.

use tracing::debug;

use crate::state::PipelineState;

/// Classification of the current review result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Score reached the threshold (or no score was recorded).
    Passed,
    /// Score too low and revisions remain.
    Rework,
    /// Score too low but the revision budget is spent.
    Exhausted,
}

/// Score/budget router configured per pipeline instance.
///
/// `revision_field` is incremented by the revising stage itself on every pass;
/// the gate only reads it. A missing score counts as passed, a missing
/// counter as zero.
///
/// **Interaction**: Attached with `PipelineGraph::add_revision_gate`; evaluated
/// by `Execution` after the reviewer's update is merged. Publish stages may
/// call `outcome` to flag budget-exhausted artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionGate {
    rework_stage: String,
    done_stage: String,
    score_field: String,
    revision_field: String,
    pass_threshold: f64,
    max_revisions: u32,
}

impl RevisionGate {
    pub const DEFAULT_SCORE_FIELD: &'static str = "review_score";
    pub const DEFAULT_REVISION_FIELD: &'static str = "revision_count";
    pub const DEFAULT_THRESHOLD: f64 = 7.0;
    pub const DEFAULT_MAX_REVISIONS: u32 = 2;

    /// Gate routing to `rework_stage` or `done_stage`, with default fields and limits.
    pub fn new(rework_stage: impl Into<String>, done_stage: impl Into<String>) -> Self {
        Self {
            rework_stage: rework_stage.into(),
            done_stage: done_stage.into(),
            score_field: Self::DEFAULT_SCORE_FIELD.to_string(),
            revision_field: Self::DEFAULT_REVISION_FIELD.to_string(),
            pass_threshold: Self::DEFAULT_THRESHOLD,
            max_revisions: Self::DEFAULT_MAX_REVISIONS,
        }
    }

    pub fn with_score_field(mut self, field: impl Into<String>) -> Self {
        self.score_field = field.into();
        self
    }

    pub fn with_revision_field(mut self, field: impl Into<String>) -> Self {
        self.revision_field = field.into();
        self
    }

    pub fn with_threshold(mut self, pass_threshold: f64) -> Self {
        self.pass_threshold = pass_threshold;
        self
    }

    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    pub fn rework_stage(&self) -> &str {
        &self.rework_stage
    }

    pub fn done_stage(&self) -> &str {
        &self.done_stage
    }

    pub fn score_field(&self) -> &str {
        &self.score_field
    }

    pub fn revision_field(&self) -> &str {
        &self.revision_field
    }

    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    pub fn max_revisions(&self) -> u32 {
        self.max_revisions
    }

    /// Pure decision core: same inputs, same outcome.
    pub fn outcome_for(&self, score: Option<f64>, revision_count: u64) -> GateOutcome {
        let passed = score.map_or(true, |s| s >= self.pass_threshold);
        if passed {
            GateOutcome::Passed
        } else if revision_count < u64::from(self.max_revisions) {
            GateOutcome::Rework
        } else {
            GateOutcome::Exhausted
        }
    }

    /// Outcome for the score and counter currently in `state`.
    pub fn outcome(&self, state: &PipelineState) -> GateOutcome {
        let score = state.number(&self.score_field);
        let revisions = state
            .int(&self.revision_field)
            .map(|n| n.max(0) as u64)
            .unwrap_or(0);
        self.outcome_for(score, revisions)
    }

    /// Next stage name for `state`: rework stage or terminal stage.
    pub fn decide(&self, state: &PipelineState) -> &str {
        let outcome = self.outcome(state);
        debug!(
            score = ?state.number(&self.score_field),
            revisions = ?state.int(&self.revision_field),
            threshold = self.pass_threshold,
            max_revisions = self.max_revisions,
            ?outcome,
            "revision gate"
        );
        self.stage_for(outcome)
    }

    /// Next stage name for explicit inputs.
    pub fn decide_for(&self, score: Option<f64>, revision_count: u64) -> &str {
        self.stage_for(self.outcome_for(score, revision_count))
    }

    fn stage_for(&self, outcome: GateOutcome) -> &str {
        match outcome {
            GateOutcome::Rework => &self.rework_stage,
            GateOutcome::Passed | GateOutcome::Exhausted => &self.done_stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> RevisionGate {
        RevisionGate::new("writer", "publish")
            .with_threshold(7.0)
            .with_max_revisions(2)
    }

    #[test]
    fn low_score_with_budget_reworks() {
        assert_eq!(gate().decide_for(Some(6.0), 0), "writer");
    }

    #[test]
    fn exhausted_budget_publishes_regardless_of_score() {
        assert_eq!(gate().decide_for(Some(6.0), 2), "publish");
        assert_eq!(gate().decide_for(Some(1.0), 5), "publish");
        assert_eq!(gate().outcome_for(Some(6.0), 2), GateOutcome::Exhausted);
    }

    #[test]
    fn passing_score_publishes() {
        assert_eq!(gate().decide_for(Some(7.0), 0), "publish");
        assert_eq!(gate().outcome_for(Some(9.0), 1), GateOutcome::Passed);
    }

    #[test]
    fn missing_score_counts_as_passed() {
        assert_eq!(gate().outcome(&PipelineState::new()), GateOutcome::Passed);
    }

    #[test]
    fn decide_reads_configured_fields() {
        let g = RevisionGate::new("content_creator", "platform_adapter")
            .with_score_field("editor_score")
            .with_threshold(8.0);
        let state = PipelineState::new()
            .with("editor_score", 7)
            .with("revision_count", 1);
        assert_eq!(g.decide(&state), "content_creator");
        let state = state.with("revision_count", 2);
        assert_eq!(g.decide(&state), "platform_adapter");
    }

    #[test]
    fn decide_is_idempotent() {
        let g = gate();
        for score in [0.0, 6.9, 7.0, 10.0] {
            for rc in 0..4u64 {
                assert_eq!(g.decide_for(Some(score), rc), g.decide_for(Some(score), rc));
            }
        }
    }
}
