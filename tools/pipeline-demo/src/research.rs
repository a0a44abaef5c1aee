//! Research report pipeline.
//!
//! planner → researcher → analyst → writer → reviewer → (gate) → writer | publish
//!
//! The reviewer scores each draft; below the pass threshold the writer revises
//! with the review feedback until the revision budget is spent.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::json;
use stagegraph::{
    parse_or_fallback, stage_fn, ChatMessage, CompilationError, GateOutcome, LlmClient, Pipeline,
    PipelineGraph, PipelineState, ReviewStage, Stage, StageError, StateSchema, StateUpdate,
    ToolRegistry, END, START,
};
use tracing::info;

use crate::config::Config;
use crate::prompts;
use crate::tools;

pub const PLANNER: &str = "planner";
pub const RESEARCHER: &str = "researcher";
pub const ANALYST: &str = "analyst";
pub const WRITER: &str = "writer";
pub const REVIEWER: &str = "reviewer";
pub const PUBLISH: &str = "publish";

/// Field names of the research state.
pub mod fields {
    pub const TOPIC: &str = "topic";
    pub const SUB_QUESTIONS: &str = "sub_questions";
    pub const RESEARCH_DATA: &str = "research_data";
    pub const ANALYSIS: &str = "analysis";
    pub const DRAFT: &str = "draft";
    pub const REVIEW: &str = "review";
    pub const REVIEW_SCORE: &str = "review_score";
    pub const REVISION_COUNT: &str = "revision_count";
    pub const FINAL_REPORT: &str = "final_report";
    /// Set on the final report when the revision budget ran out below threshold.
    pub const UNREVIEWED: &str = "unreviewed";
    pub const PROGRESS: &str = "progress";
}

use fields::*;

/// Initial state for `topic`.
pub fn initial_state(topic: &str) -> PipelineState {
    PipelineState::new()
        .with(TOPIC, topic)
        .with(REVISION_COUNT, 0)
}

/// Stage executions a full run can take with `max_revisions` rework rounds.
///
/// Planner, researcher and analyst, then a writer/reviewer pair per draft
/// (at least one draft), then publish; two spare steps.
pub fn step_budget(max_revisions: u32) -> usize {
    2 * max_revisions.max(1) as usize + 6
}

fn required<'s>(state: &'s PipelineState, field: &str) -> Result<&'s str, StageError> {
    state
        .text(field)
        .ok_or_else(|| StageError::MissingField(field.to_string()))
}

/// Sub-questions used when the planner's output is not a JSON array.
pub fn fallback_questions(topic: &str) -> Vec<String> {
    vec![
        format!("{topic}: current state of development and market size"),
        format!("{topic}: core technologies and innovation trends"),
        format!("{topic}: main challenges and risks"),
        format!("{topic}: future outlook and investment opportunities"),
    ]
}

struct Planner {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for Planner {
    fn name(&self) -> &str {
        PLANNER
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let topic = required(state, TOPIC)?;
        let prompt = ChatMessage::prompt(prompts::PLANNER, format!("Research topic: {topic}"));
        let raw = self.llm.generate(&prompt, self.temperature).await?;
        let questions: Vec<String> = parse_or_fallback(PLANNER, &raw, || fallback_questions(topic))
            .into_inner()
            .into_iter()
            .filter(|q| !q.trim().is_empty())
            .collect();
        let questions = if questions.is_empty() {
            fallback_questions(topic)
        } else {
            questions
        };

        let mut line = format!("Planner split the topic into {} sub-questions:", questions.len());
        for (i, q) in questions.iter().enumerate() {
            line.push_str(&format!("\n   {}. {q}", i + 1));
        }
        Ok(StateUpdate::new()
            .set(SUB_QUESTIONS, json!(questions))
            .push(PROGRESS, line))
    }
}

struct Researcher {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    temperature: f32,
}

impl Researcher {
    async fn research(&self, question: &str) -> Result<String, StageError> {
        let args = json!({ "query": question });
        let mut sources = Vec::with_capacity(3);
        for tool in [tools::WEB_SEARCH, tools::ACADEMIC_SEARCH, tools::MARKET_DATA] {
            sources.push(self.tools.execute_text(tool, args.clone()).await?);
        }
        let prompt = ChatMessage::prompt(
            prompts::RESEARCHER,
            format!(
                "Sub-question: {question}\n\nSearch results:\n{}",
                sources.join("\n\n")
            ),
        );
        Ok(self.llm.generate(&prompt, self.temperature).await?)
    }
}

#[async_trait]
impl Stage for Researcher {
    fn name(&self) -> &str {
        RESEARCHER
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let questions = state.strings(SUB_QUESTIONS);
        if questions.is_empty() {
            return Err(StageError::MissingField(SUB_QUESTIONS.to_string()));
        }
        let findings = try_join_all(questions.iter().map(|q| self.research(q))).await?;

        let total = questions.len();
        let mut update = StateUpdate::new();
        for (i, (question, finding)) in questions.iter().zip(findings).enumerate() {
            update = update
                .push(
                    RESEARCH_DATA,
                    format!("### Sub-question {}: {question}\n\n{finding}", i + 1),
                )
                .push(
                    PROGRESS,
                    format!("Researcher finished sub-question {}/{total}", i + 1),
                );
        }
        Ok(update)
    }
}

struct Analyst {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for Analyst {
    fn name(&self) -> &str {
        ANALYST
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let topic = required(state, TOPIC)?;
        let data = state.strings(RESEARCH_DATA);
        if data.is_empty() {
            return Err(StageError::MissingField(RESEARCH_DATA.to_string()));
        }
        let prompt = ChatMessage::prompt(
            prompts::ANALYST,
            format!(
                "Topic: {topic}\n\nResearch findings:\n{}",
                data.join("\n\n---\n\n")
            ),
        );
        let analysis = self.llm.generate(&prompt, self.temperature).await?;
        Ok(StateUpdate::new()
            .set(ANALYSIS, analysis)
            .push(PROGRESS, "Analyst finished the cross-analysis"))
    }
}

struct Writer {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for Writer {
    fn name(&self) -> &str {
        WRITER
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let topic = required(state, TOPIC)?;
        let analysis = required(state, ANALYSIS)?;
        let revisions = state.int(REVISION_COUNT).unwrap_or(0).max(0);

        let mut user = format!("Topic: {topic}\n\nAnalysis:\n{analysis}");
        if revisions > 0 {
            if let Some(feedback) = state.text(REVIEW) {
                user.push_str(&format!(
                    "\n\nReviewer feedback on the previous draft (address every point):\n{feedback}"
                ));
            }
            if let Some(previous) = state.text(DRAFT) {
                user.push_str(&format!("\n\nPrevious draft:\n{previous}"));
            }
        }
        let draft = self
            .llm
            .generate(&ChatMessage::prompt(prompts::WRITER, user), self.temperature)
            .await?;

        let version = revisions + 1;
        let kind = if revisions == 0 { "first draft" } else { "revision" };
        info!(version, chars = draft.chars().count(), "draft written");
        Ok(StateUpdate::new()
            .set(DRAFT, draft)
            .set(REVISION_COUNT, version)
            .push(PROGRESS, format!("Writer finished {kind} (v{version})")))
    }
}

/// Builds the research pipeline from `config`.
pub fn build(llm: Arc<dyn LlmClient>, config: &Config) -> Result<Pipeline, CompilationError> {
    let gate = config.research_gate.gate(WRITER, PUBLISH);
    let publish_gate = gate.clone();
    let tools = tools::registry();
    let t = config.analytic_temperature;

    let schema = StateSchema::new()
        .append(RESEARCH_DATA)
        .append(PROGRESS);
    let mut graph = PipelineGraph::new(schema).with_max_steps(config.max_steps);
    graph
        .add_stage(Planner {
            llm: llm.clone(),
            temperature: t,
        })
        .add_stage(Researcher {
            llm: llm.clone(),
            tools,
            temperature: t,
        })
        .add_stage(Analyst {
            llm: llm.clone(),
            temperature: t,
        })
        .add_stage(Writer {
            llm: llm.clone(),
            temperature: config.writer_temperature,
        })
        .add_stage(
            ReviewStage::new(REVIEWER, llm, prompts::REVIEWER)
                .with_label("Reviewer")
                .with_input("Topic", TOPIC)
                .with_input("Report", DRAFT)
                .with_score_field(REVIEW_SCORE)
                .with_feedback_field(REVIEW)
                .with_threshold(config.research_gate.threshold)
                .with_temperature(t),
        )
        .add_stage(stage_fn(PUBLISH, move |s: &PipelineState| {
            let draft = required(s, DRAFT)?;
            let unreviewed = publish_gate.outcome(s) == GateOutcome::Exhausted;
            let line = if unreviewed {
                "Report published without passing review (revision budget spent)"
            } else {
                "Report published"
            };
            Ok(StateUpdate::new()
                .set(FINAL_REPORT, draft)
                .set(UNREVIEWED, unreviewed)
                .push(PROGRESS, line))
        }))
        .add_edge(START, PLANNER)
        .add_edge(PLANNER, RESEARCHER)
        .add_edge(RESEARCHER, ANALYST)
        .add_edge(ANALYST, WRITER)
        .add_edge(WRITER, REVIEWER)
        .add_revision_gate(REVIEWER, gate)
        .add_edge(PUBLISH, END);
    graph.compile()
}
