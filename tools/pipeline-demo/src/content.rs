//! Multi-platform content pipeline.
//!
//! planner → trend_researcher → content_creator → {fact_checker, seo_optimizer}
//! → editor → (gate) → content_creator | platform_adapter
//!
//! Fact checking and SEO run concurrently on the same draft; the editor sees
//! both results once they are merged.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stagegraph::{
    parse_or_fallback, stage_fn, ChatMessage, CompilationError, GateOutcome, LlmClient, Pipeline,
    PipelineGraph, PipelineState, ReviewStage, RevisionGate, Stage, StageError, StateSchema,
    StateUpdate, ToolRegistry, END, START,
};

use crate::config::Config;
use crate::prompts;
use crate::tools;

pub const PLANNER: &str = "planner";
pub const TREND_RESEARCHER: &str = "trend_researcher";
pub const CREATOR: &str = "content_creator";
pub const FACT_CHECKER: &str = "fact_checker";
pub const SEO_OPTIMIZER: &str = "seo_optimizer";
pub const EDITOR: &str = "editor";
pub const PLATFORM_ADAPTER: &str = "platform_adapter";

pub mod fields {
    pub const TOPIC: &str = "topic";
    pub const STYLE: &str = "style";
    pub const PLAN: &str = "plan";
    pub const TREND_DATA: &str = "trend_data";
    pub const DRAFT: &str = "draft";
    pub const FACT_CHECK_RESULT: &str = "fact_check_result";
    pub const FACT_CHECK_PASSED: &str = "fact_check_passed";
    pub const SEO_SUGGESTIONS: &str = "seo_suggestions";
    pub const EDITOR_REVIEW: &str = "editor_review";
    pub const EDITOR_SCORE: &str = "editor_score";
    pub const REVISION_COUNT: &str = "revision_count";
    pub const PLATFORM_VERSIONS: &str = "platform_versions";
    pub const UNREVIEWED: &str = "unreviewed";
    pub const PROGRESS: &str = "progress";
}

use fields::*;

const WEIBO_CHARS: usize = 280;
const XIAOHONGSHU_CHARS: usize = 800;
const LISTED_ISSUES: usize = 3;

pub fn initial_state(topic: &str, style: &str) -> PipelineState {
    PipelineState::new()
        .with(TOPIC, topic)
        .with(STYLE, style)
        .with(REVISION_COUNT, 0)
}

fn required<'s>(state: &'s PipelineState, field: &str) -> Result<&'s str, StageError> {
    state
        .text(field)
        .ok_or_else(|| StageError::MissingField(field.to_string()))
}

fn style_of(state: &PipelineState) -> &str {
    state.text(STYLE).unwrap_or("professional")
}

/// The fixed production plan.
pub fn plan(style: &str) -> Vec<String> {
    vec![
        "Research trending angles and competing content".to_string(),
        format!("Write the article in a {style} style"),
        "Fact-check claims and data".to_string(),
        "Optimize for search".to_string(),
        "Editorial review".to_string(),
        "Adapt for each platform".to_string(),
    ]
}

struct TrendResearcher {
    tools: ToolRegistry,
}

#[async_trait]
impl Stage for TrendResearcher {
    fn name(&self) -> &str {
        TREND_RESEARCHER
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let topic = required(state, TOPIC)?;
        let args = json!({ "topic": topic });
        let hot = self.tools.execute_text(tools::HOT_TOPICS, args.clone()).await?;
        let competitors = self.tools.execute_text(tools::COMPETITOR_CONTENT, args).await?;
        Ok(StateUpdate::new()
            .set(TREND_DATA, format!("{hot}\n\n---\n\n{competitors}"))
            .push(PROGRESS, "Trend research finished"))
    }
}

struct ContentCreator {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for ContentCreator {
    fn name(&self) -> &str {
        CREATOR
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let topic = required(state, TOPIC)?;
        let trends = required(state, TREND_DATA)?;
        let revisions = state.int(REVISION_COUNT).unwrap_or(0).max(0);

        let system = format!(
            "{}\n\nStyle: {}",
            prompts::CONTENT_CREATOR,
            prompts::style_guide(style_of(state))
        );
        let mut user = format!("Topic: {topic}\n\nTrend research:\n{trends}");
        if revisions > 0 {
            if let Some(feedback) = state.text(EDITOR_REVIEW) {
                user.push_str(&format!(
                    "\n\nEditor feedback on the previous version (fix these first):\n{feedback}"
                ));
            }
        }
        let draft = self
            .llm
            .generate(&ChatMessage::prompt(system, user), self.temperature)
            .await?;

        let version = revisions + 1;
        let kind = if revisions == 0 { "first draft" } else { "revision" };
        Ok(StateUpdate::new()
            .set(DRAFT, draft)
            .set(REVISION_COUNT, version)
            .push(PROGRESS, format!("Creator finished {kind} (v{version})")))
    }
}

/// One problem found by the fact checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactIssue {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheck {
    #[serde(default)]
    pub issues: Vec<FactIssue>,
    #[serde(default)]
    pub overall: String,
    #[serde(default = "default_passed")]
    pub passed: bool,
}

fn default_passed() -> bool {
    true
}

impl FactCheck {
    /// Used when the checker's output cannot be parsed.
    pub fn passed_by_default() -> Self {
        Self {
            issues: Vec::new(),
            overall: "fact check result unavailable, treated as passed".to_string(),
            passed: true,
        }
    }

    fn progress_line(&self) -> String {
        if self.passed {
            return "Fact check passed".to_string();
        }
        let mut line = format!("Fact check found {} issue(s)", self.issues.len());
        for issue in self.issues.iter().take(LISTED_ISSUES) {
            line.push_str(&format!(
                "\n   [{}] {}: {}",
                issue.severity, issue.location, issue.problem
            ));
        }
        line
    }

    fn render(&self) -> String {
        let mut out = if self.overall.trim().is_empty() {
            "no summary given".to_string()
        } else {
            self.overall.clone()
        };
        for issue in &self.issues {
            out.push_str(&format!(
                "\n- [{}] {}: {}",
                issue.severity, issue.location, issue.problem
            ));
        }
        out
    }
}

struct FactChecker {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for FactChecker {
    fn name(&self) -> &str {
        FACT_CHECKER
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let draft = required(state, DRAFT)?;
        let prompt = ChatMessage::prompt(prompts::FACT_CHECKER, format!("Article:\n{draft}"));
        let raw = self.llm.generate(&prompt, self.temperature).await?;
        let check = parse_or_fallback(FACT_CHECKER, &raw, FactCheck::passed_by_default).into_inner();
        Ok(StateUpdate::new()
            .set(FACT_CHECK_RESULT, check.render())
            .set(FACT_CHECK_PASSED, check.passed)
            .push(PROGRESS, check.progress_line()))
    }
}

struct SeoOptimizer {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for SeoOptimizer {
    fn name(&self) -> &str {
        SEO_OPTIMIZER
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let topic = required(state, TOPIC)?;
        let draft = required(state, DRAFT)?;
        let prompt = ChatMessage::prompt(
            prompts::SEO_OPTIMIZER,
            format!("Topic: {topic}\n\nArticle:\n{draft}"),
        );
        let suggestions = self.llm.generate(&prompt, self.temperature).await?;
        Ok(StateUpdate::new()
            .set(SEO_SUGGESTIONS, suggestions)
            .push(PROGRESS, "SEO suggestions ready"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WechatVersion {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostVersion {
    pub title: String,
    pub content: String,
}

/// Per-platform renditions of the final article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformVersions {
    pub wechat: WechatVersion,
    pub weibo: PostVersion,
    pub xiaohongshu: PostVersion,
}

fn prefix(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

impl PlatformVersions {
    /// The draft itself, cut to each platform's length.
    pub fn from_draft(topic: &str, draft: &str) -> Self {
        Self {
            wechat: WechatVersion {
                title: topic.to_string(),
                summary: String::new(),
                content: draft.to_string(),
            },
            weibo: PostVersion {
                title: topic.to_string(),
                content: prefix(draft, WEIBO_CHARS),
            },
            xiaohongshu: PostVersion {
                title: topic.to_string(),
                content: prefix(draft, XIAOHONGSHU_CHARS),
            },
        }
    }
}

struct PlatformAdapter {
    llm: Arc<dyn LlmClient>,
    gate: RevisionGate,
    temperature: f32,
}

#[async_trait]
impl Stage for PlatformAdapter {
    fn name(&self) -> &str {
        PLATFORM_ADAPTER
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let topic = required(state, TOPIC)?;
        let draft = required(state, DRAFT)?;
        let prompt = ChatMessage::prompt(
            prompts::PLATFORM_ADAPTER,
            format!("Topic: {topic}\n\nArticle:\n{draft}"),
        );
        let raw = self.llm.generate(&prompt, self.temperature).await?;
        let parsed = parse_or_fallback(PLATFORM_ADAPTER, &raw, || {
            PlatformVersions::from_draft(topic, draft)
        });
        let line = if parsed.is_fallback() {
            "Platform versions cut from the draft (adapter output unusable)"
        } else {
            "Platform versions ready: wechat, weibo, xiaohongshu"
        };
        let unreviewed = self.gate.outcome(state) == GateOutcome::Exhausted;
        StateUpdate::new()
            .set(UNREVIEWED, unreviewed)
            .push(PROGRESS, line)
            .set_serialized(PLATFORM_VERSIONS, parsed.value())
            .map_err(|e| StageError::Failed(e.to_string()))
    }
}

/// Builds the content pipeline from `config`.
/// Stage executions a full run can take with `max_revisions` rework rounds.
///
/// Planner and trend research, then creator, both checks and editor per
/// draft (at least one draft), then the platform adapter; spare steps on top.
pub fn step_budget(max_revisions: u32) -> usize {
    4 * max_revisions.max(1) as usize + 7
}

pub fn build(llm: Arc<dyn LlmClient>, config: &Config) -> Result<Pipeline, CompilationError> {
    let gate = config
        .content_gate
        .gate(CREATOR, PLATFORM_ADAPTER)
        .with_score_field(EDITOR_SCORE);
    let tools = tools::registry();
    let t = config.analytic_temperature;

    let schema = StateSchema::new().append(PROGRESS);
    let mut graph = PipelineGraph::new(schema).with_max_steps(config.max_steps);
    graph
        .add_stage(stage_fn(PLANNER, |s: &PipelineState| {
            let steps = plan(style_of(s));
            let line = format!("Plan: {}", steps.join(" → "));
            Ok(StateUpdate::new().set(PLAN, json!(steps)).push(PROGRESS, line))
        }))
        .add_stage(TrendResearcher { tools })
        .add_stage(ContentCreator {
            llm: llm.clone(),
            temperature: config.creator_temperature,
        })
        .add_stage(FactChecker {
            llm: llm.clone(),
            temperature: t,
        })
        .add_stage(SeoOptimizer {
            llm: llm.clone(),
            temperature: t,
        })
        .add_stage(
            ReviewStage::new(EDITOR, llm.clone(), prompts::EDITOR)
                .with_label("Editor")
                .with_input("Topic", TOPIC)
                .with_input("Article", DRAFT)
                .with_input("Fact check", FACT_CHECK_RESULT)
                .with_input("SEO suggestions", SEO_SUGGESTIONS)
                .with_score_field(EDITOR_SCORE)
                .with_feedback_field(EDITOR_REVIEW)
                .with_threshold(config.content_gate.threshold)
                .with_temperature(t),
        )
        .add_stage(PlatformAdapter {
            llm,
            gate: gate.clone(),
            temperature: t,
        })
        .add_edge(START, PLANNER)
        .add_edge(PLANNER, TREND_RESEARCHER)
        .add_edge(TREND_RESEARCHER, CREATOR)
        .add_fan_out(CREATOR, [FACT_CHECKER, SEO_OPTIMIZER], EDITOR)
        .add_revision_gate(EDITOR, gate)
        .add_edge(PLATFORM_ADAPTER, END);
    graph.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagegraph::MockLlm;

    fn editor(score: u32) -> String {
        format!(r#"{{"overall_score": {score}, "feedback": "tighten the intro"}}"#)
    }

    const ADAPTED: &str = r#"{"wechat": {"title": "W", "summary": "S", "content": "long"},
        "weibo": {"title": "B", "content": "short"},
        "xiaohongshu": {"title": "X", "content": "casual"}}"#;

    #[tokio::test]
    async fn fan_out_results_reach_the_editor() {
        let llm = Arc::new(
            MockLlm::fixed("article body")
                .on("fact checker", r#"{"issues": [], "overall": "ok", "passed": true}"#)
                .on("SEO optimizer", "use keyword X")
                .on("chief editor", editor(9))
                .on("platform adapter", ADAPTED),
        );
        let pipeline = build(llm.clone(), &Config::offline()).unwrap();
        let state = pipeline.invoke(initial_state("home coffee", "casual")).await.unwrap();

        assert_eq!(state.int(REVISION_COUNT), Some(1));
        assert_eq!(state.flag(FACT_CHECK_PASSED), Some(true));
        assert_eq!(state.flag(UNREVIEWED), Some(false));
        let versions: PlatformVersions = state.get_as(PLATFORM_VERSIONS).unwrap();
        assert_eq!(versions.weibo.content, "short");

        let requests = llm.requests().await;
        let review = requests
            .iter()
            .find(|r| r.messages[0].content == prompts::EDITOR)
            .unwrap();
        assert!(review.messages[1].content.contains("SEO suggestions:\nuse keyword X"));
        let creator = requests
            .iter()
            .find(|r| r.messages[0].content.starts_with(prompts::CONTENT_CREATOR))
            .unwrap();
        assert!(creator.messages[0].content.contains(prompts::style_guide("casual")));
        assert_eq!(creator.temperature, 0.8);
    }

    #[tokio::test]
    async fn low_editor_scores_stop_at_budget() {
        let llm = Arc::new(
            MockLlm::fixed("draft")
                .on("fact checker", "garbage")
                .on("chief editor", editor(6))
                .on("platform adapter", "not json"),
        );
        let pipeline = build(llm, &Config::offline()).unwrap();
        let state = pipeline.invoke(initial_state("t", "professional")).await.unwrap();

        assert_eq!(state.int(REVISION_COUNT), Some(2));
        assert_eq!(state.flag(UNREVIEWED), Some(true));
        assert_eq!(state.flag(FACT_CHECK_PASSED), Some(true));
        let versions: PlatformVersions = state.get_as(PLATFORM_VERSIONS).unwrap();
        assert_eq!(versions, PlatformVersions::from_draft("t", "draft"));
    }

    #[tokio::test]
    async fn large_revision_budget_reaches_adapter() {
        let cli = crate::config::Overrides {
            offline: true,
            max_revisions: Some(7),
            ..Default::default()
        };
        let config = Config::resolve(|_| None, &cli).unwrap();
        let llm = Arc::new(
            MockLlm::fixed("draft")
                .on("chief editor", editor(4))
                .on("platform adapter", ADAPTED),
        );
        let pipeline = build(llm, &config).unwrap();
        let state = pipeline.invoke(initial_state("t", "professional")).await.unwrap();
        assert_eq!(state.int(REVISION_COUNT), Some(7));
        assert_eq!(state.flag(UNREVIEWED), Some(true));
        assert!(state.contains(PLATFORM_VERSIONS));
    }

    #[test]
    fn failed_fact_check_lists_first_issues() {
        let check = FactCheck {
            issues: (1..=5)
                .map(|i| FactIssue {
                    location: format!("p{i}"),
                    problem: "wrong year".into(),
                    severity: "high".into(),
                })
                .collect(),
            overall: "several errors".into(),
            passed: false,
        };
        let line = check.progress_line();
        assert!(line.starts_with("Fact check found 5 issue(s)"));
        assert_eq!(line.lines().count(), 1 + LISTED_ISSUES);
    }

    #[test]
    fn draft_fallback_cuts_by_characters() {
        let draft = "é".repeat(1000);
        let v = PlatformVersions::from_draft("topic", &draft);
        assert_eq!(v.wechat.content.chars().count(), 1000);
        assert_eq!(v.weibo.content.chars().count(), WEIBO_CHARS);
        assert_eq!(v.xiaohongshu.content.chars().count(), XIAOHONGSHU_CHARS);
    }
}
