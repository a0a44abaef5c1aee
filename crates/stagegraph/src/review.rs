//! Review verdicts and the reusable reviewer stage.
//!
//! A reviewer asks the generator for `{scores, overall_score, passed, feedback}`
//! and writes the score and feedback where a `RevisionGate` and the revising
//! stage expect them. Unparseable verdicts become an approval so a flaky
//! generator cannot stall the loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StageError;
use crate::graph::Stage;
use crate::llm::{ChatMessage, LlmClient};
use crate::state::{PipelineState, StateUpdate};
use crate::structured::{parse_or_fallback, Parsed};

/// Feedback recorded when a verdict could not be parsed.
pub const DEFAULT_REVIEW_FEEDBACK: &str = "approved by default";

const FEEDBACK_PREVIEW_CHARS: usize = 100;

/// Parsed reviewer output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// Per-dimension scores, e.g. `{"logic": 8, "evidence": 7}`.
    pub scores: BTreeMap<String, f64>,
    pub overall_score: f64,
    pub passed: bool,
    pub feedback: String,
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default)]
    scores: BTreeMap<String, f64>,
    overall_score: Option<f64>,
    passed: Option<bool>,
    #[serde(default)]
    feedback: String,
}

impl ReviewVerdict {
    /// The fallback verdict: passed at exactly `threshold`.
    pub fn approved_by_default(threshold: f64) -> Self {
        Self {
            scores: BTreeMap::new(),
            overall_score: threshold,
            passed: true,
            feedback: DEFAULT_REVIEW_FEEDBACK.to_string(),
        }
    }

    /// Parses generator output. A missing `overall_score` is taken as
    /// `threshold`; a missing `passed` as `overall_score >= threshold`.
    pub fn parse(raw: &str, threshold: f64) -> Parsed<Self> {
        match parse_or_fallback::<RawVerdict, _>("reviewer", raw, || RawVerdict {
            scores: BTreeMap::new(),
            overall_score: None,
            passed: None,
            feedback: String::new(),
        }) {
            Parsed::Ok(v) => Parsed::Ok(Self::from_raw(v, threshold)),
            Parsed::Fallback(_) => Parsed::Fallback(Self::approved_by_default(threshold)),
        }
    }

    fn from_raw(raw: RawVerdict, threshold: f64) -> Self {
        let overall_score = raw.overall_score.unwrap_or(threshold);
        Self {
            scores: raw.scores,
            overall_score,
            passed: raw.passed.unwrap_or(overall_score >= threshold),
            feedback: raw.feedback,
        }
    }

    /// One-line `name:score` summary of the detail scores.
    pub fn score_summary(&self) -> String {
        self.scores
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Reviewer stage: renders its inputs into a prompt, parses the verdict,
/// writes score, feedback and a progress line.
///
/// Every configured input field is required; a missing one is a fatal
/// `StageError::MissingField`.
///
/// **Interaction**: Paired with a `RevisionGate` reading `score_field`; the
/// rework stage reads `feedback_field` on its next pass.
pub struct ReviewStage {
    name: String,
    label: String,
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    inputs: Vec<(String, String)>,
    score_field: String,
    feedback_field: String,
    verdict_field: Option<String>,
    progress_field: Option<String>,
    threshold: f64,
    temperature: f32,
}

impl ReviewStage {
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            llm,
            system_prompt: system_prompt.into(),
            inputs: Vec::new(),
            score_field: "review_score".to_string(),
            feedback_field: "review".to_string(),
            verdict_field: None,
            progress_field: Some("progress".to_string()),
            threshold: 7.0,
            temperature: 0.0,
        }
    }

    /// Adds `field` to the prompt under `label`.
    pub fn with_input(mut self, label: impl Into<String>, field: impl Into<String>) -> Self {
        self.inputs.push((label.into(), field.into()));
        self
    }

    /// Display name used in progress lines.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_score_field(mut self, field: impl Into<String>) -> Self {
        self.score_field = field.into();
        self
    }

    pub fn with_feedback_field(mut self, field: impl Into<String>) -> Self {
        self.feedback_field = field.into();
        self
    }

    /// Also stores the whole verdict as JSON in `field`.
    pub fn with_verdict_field(mut self, field: impl Into<String>) -> Self {
        self.verdict_field = Some(field.into());
        self
    }

    /// `None` disables the progress line.
    pub fn with_progress_field(mut self, field: Option<String>) -> Self {
        self.progress_field = field;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn user_prompt(&self, state: &PipelineState) -> Result<String, StageError> {
        let mut sections = Vec::with_capacity(self.inputs.len());
        for (label, field) in &self.inputs {
            let value = state
                .text(field)
                .ok_or_else(|| StageError::MissingField(field.clone()))?;
            sections.push(format!("{label}:\n{value}"));
        }
        Ok(sections.join("\n\n"))
    }

    fn progress_line(&self, verdict: &ReviewVerdict) -> String {
        let status = if verdict.passed { "passed" } else { "needs revision" };
        let preview: String = verdict.feedback.chars().take(FEEDBACK_PREVIEW_CHARS).collect();
        let ellipsis = if verdict.feedback.chars().count() > FEEDBACK_PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        let mut line = format!(
            "{} review complete: {status} (overall {}/10)",
            self.label, verdict.overall_score
        );
        if !verdict.scores.is_empty() {
            line.push_str(&format!("\n   {}", verdict.score_summary()));
        }
        line.push_str(&format!("\n   feedback: {preview}{ellipsis}"));
        line
    }
}

#[async_trait]
impl Stage for ReviewStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let prompt = ChatMessage::prompt(self.system_prompt.clone(), self.user_prompt(state)?);
        let raw = self.llm.generate(&prompt, self.temperature).await?;
        let parsed = ReviewVerdict::parse(&raw, self.threshold);
        let fallback = parsed.is_fallback();
        let verdict = parsed.into_inner();
        info!(
            stage = %self.name,
            score = verdict.overall_score,
            passed = verdict.passed,
            fallback,
            "review verdict"
        );

        let mut update = StateUpdate::new()
            .set(self.score_field.clone(), verdict.overall_score)
            .set(self.feedback_field.clone(), verdict.feedback.clone());
        if let Some(field) = &self.verdict_field {
            update = update
                .set_serialized(field.clone(), &verdict)
                .map_err(|e| StageError::Failed(e.to_string()))?;
        }
        if let Some(field) = &self.progress_field {
            update = update.push(field.clone(), self.progress_line(&verdict));
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    #[test]
    fn parses_full_verdict() {
        let raw = r#"```json
{"scores": {"logic": 8, "evidence": 6}, "overall_score": 6.5, "passed": false, "feedback": "add data"}
```"#;
        let v = ReviewVerdict::parse(raw, 7.0);
        assert!(!v.is_fallback());
        let v = v.into_inner();
        assert_eq!(v.overall_score, 6.5);
        assert!(!v.passed);
        assert_eq!(v.score_summary(), "evidence:6 | logic:8");
    }

    #[test]
    fn missing_fields_follow_threshold() {
        let v = ReviewVerdict::parse(r#"{"feedback": "fine"}"#, 8.0).into_inner();
        assert_eq!(v.overall_score, 8.0);
        assert!(v.passed);

        let v = ReviewVerdict::parse(r#"{"overall_score": 5}"#, 8.0).into_inner();
        assert!(!v.passed);
    }

    #[test]
    fn garbage_is_approved_by_default() {
        let v = ReviewVerdict::parse("I think it is quite good!", 7.0);
        assert!(v.is_fallback());
        assert_eq!(v.into_inner(), ReviewVerdict::approved_by_default(7.0));
    }

    #[test]
    fn fallback_round_trips_through_parse() {
        let fallback = ReviewVerdict::approved_by_default(7.0);
        let json = serde_json::to_string(&fallback).unwrap();
        assert_eq!(ReviewVerdict::parse(&json, 7.0), Parsed::Ok(fallback));
    }

    #[tokio::test]
    async fn stage_writes_score_feedback_and_progress() {
        let llm = Arc::new(MockLlm::fixed(
            r#"{"scores": {"logic": 5}, "overall_score": 5, "passed": false, "feedback": "too thin"}"#,
        ));
        let stage = ReviewStage::new("reviewer", llm.clone(), "You review reports.")
            .with_label("Reviewer")
            .with_input("Topic", "topic")
            .with_input("Report", "draft")
            .with_verdict_field("review_detail");
        let state = PipelineState::new()
            .with("topic", "batteries")
            .with("draft", "short draft");

        let update = stage.run(&state).await.unwrap();
        assert_eq!(update.get("review_score"), Some(&serde_json::json!(5.0)));
        assert_eq!(update.str("review"), Some("too thin"));
        assert!(update.contains("review_detail"));
        let progress = update.items("progress");
        assert!(progress[0]
            .as_str()
            .unwrap()
            .starts_with("Reviewer review complete: needs revision (overall 5/10)"));

        let requests = llm.requests().await;
        assert_eq!(requests[0].temperature, 0.0);
        assert!(requests[0].messages[1].content.contains("Report:\nshort draft"));
    }

    #[tokio::test]
    async fn stage_requires_inputs() {
        let stage = ReviewStage::new("reviewer", Arc::new(MockLlm::fixed("{}")), "review")
            .with_input("Report", "draft");
        let err = stage.run(&PipelineState::new()).await.unwrap_err();
        assert!(matches!(err, StageError::MissingField(ref f) if f == "draft"));
    }

    #[tokio::test]
    async fn unavailable_generator_is_fatal() {
        let stage = ReviewStage::new("reviewer", Arc::new(MockLlm::failing("down")), "review")
            .with_input("Report", "draft");
        let state = PipelineState::new().with("draft", "text");
        assert!(matches!(
            stage.run(&state).await.unwrap_err(),
            StageError::Generation(_)
        ));
    }
}
