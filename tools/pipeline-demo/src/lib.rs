//! Demo pipelines on `stagegraph`: research report, multi-platform content,
//! customer-service desk, punny weather assistant and a history-backed tutor.
//!
//! - `config`: environment + CLI configuration
//! - `research`, `content`, `support`, `weather`: pipeline builders and their stages
//! - `tools`: canned lookup tools
//! - `offline`: scripted generator for runs without an API key
//! - `render`: terminal output

pub mod config;
pub mod content;
pub mod offline;
pub mod prompts;
pub mod render;
pub mod research;
pub mod support;
pub mod tools;
pub mod weather;

use std::sync::Arc;

use anyhow::{bail, Result};
use stagegraph::{LlmClient, OpenAiClient, Pipeline, PipelineState, StepUpdate};
use tracing::error;

pub use config::{Backend, Config, GateSettings, Overrides};

/// Generator for the configured backend.
pub fn llm_for(config: &Config) -> Arc<dyn LlmClient> {
    match &config.backend {
        Backend::Offline => Arc::new(offline::OfflineLlm::new()),
        Backend::OpenAi(openai) => Arc::new(OpenAiClient::new(openai.clone())),
    }
}

/// Trimmed topic, or an error asking for one.
pub fn require_topic(topic: &str) -> Result<&str> {
    let topic = topic.trim();
    if topic.is_empty() {
        bail!("Please enter a topic.");
    }
    Ok(topic)
}

/// Runs `pipeline` step by step, handing each update to `on_step`.
///
/// An aborted run is logged and its partial state returned, so the caller
/// renders whatever was produced (or a retry hint).
pub async fn drive(
    pipeline: &Pipeline,
    initial: PipelineState,
    mut on_step: impl FnMut(&StepUpdate),
) -> PipelineState {
    let mut run = pipeline.start(initial);
    while let Some(step) = run.next_step().await {
        match step {
            Ok(step) => on_step(&step),
            Err(e) => {
                error!(error = %e.error, steps = run.steps(), "run aborted");
                return e.state;
            }
        }
    }
    run.into_state()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::final_artifact;
    use stagegraph::MockLlm;

    #[test]
    fn blank_topic_is_rejected() {
        let err = require_topic("  \t").unwrap_err();
        assert_eq!(err.to_string(), "Please enter a topic.");
        assert_eq!(require_topic(" edge AI ").unwrap(), "edge AI");
    }

    #[tokio::test]
    async fn failed_run_renders_retry_hint() {
        let pipeline =
            research::build(Arc::new(MockLlm::failing("down")), &Config::offline()).unwrap();
        let mut stages = Vec::new();
        let state = drive(&pipeline, research::initial_state("x"), |s| {
            stages.push(s.stage.clone())
        })
        .await;
        assert!(stages.is_empty());
        assert_eq!(state.str(research::fields::TOPIC), Some("x"));
        assert_eq!(
            final_artifact(&state, research::fields::FINAL_REPORT, "report"),
            "No report was produced. Please retry."
        );
    }

    #[tokio::test]
    async fn completed_run_reports_every_step() {
        let pipeline = research::build(Arc::new(offline::OfflineLlm::new()), &Config::offline())
            .unwrap();
        let mut stages = Vec::new();
        let state = drive(&pipeline, research::initial_state("x"), |s| {
            stages.push(s.stage.clone())
        })
        .await;
        assert_eq!(stages.first().map(String::as_str), Some(research::PLANNER));
        assert_eq!(stages.last().map(String::as_str), Some(research::PUBLISH));
        assert!(state.text(research::fields::FINAL_REPORT).is_some());
    }
}
