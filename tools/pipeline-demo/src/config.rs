//! Configuration: generator backend, revision gates, temperatures, session.
//!
//! **Interaction**: Used by `main` to build the generator and the pipelines.
//! Loads from environment and CLI overrides via `Config::from_env_and_args`.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use stagegraph::{OpenAiConfig, RevisionGate, DEFAULT_MAX_STEPS};

use crate::{content, research};

/// Session used by `support` and `tutor` when none is given.
pub const DEFAULT_SESSION_ID: &str = "user_001";

const RESEARCH_GATE: GateSettings = GateSettings {
    threshold: 7.0,
    max_revisions: 3,
};

const CONTENT_GATE: GateSettings = GateSettings {
    threshold: 8.0,
    max_revisions: 2,
};

/// Pass threshold and revision budget of one review loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateSettings {
    pub threshold: f64,
    pub max_revisions: u32,
}

impl GateSettings {
    /// Gate that sends low scores back to `rework` and everything else to `done`.
    pub fn gate(&self, rework: &str, done: &str) -> RevisionGate {
        RevisionGate::new(rework, done)
            .with_threshold(self.threshold)
            .with_max_revisions(self.max_revisions)
    }
}

/// Where generations come from.
#[derive(Clone, Debug)]
pub enum Backend {
    /// Scripted replies; no network.
    Offline,
    OpenAi(OpenAiConfig),
}

impl Backend {
    pub fn label(&self) -> &'static str {
        match self {
            Backend::Offline => "offline",
            Backend::OpenAi(_) => "openai",
        }
    }
}

/// Resolved configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub backend: Backend,
    pub research_gate: GateSettings,
    pub content_gate: GateSettings,
    /// Planning, analysis, review, classification.
    pub analytic_temperature: f32,
    /// Research report writer.
    pub writer_temperature: f32,
    /// Content creator.
    pub creator_temperature: f32,
    pub max_steps: usize,
    pub session_id: String,
}

/// CLI overrides shared by every subcommand.
#[derive(clap::Args, Clone, Debug, Default)]
pub struct Overrides {
    /// Use the scripted offline generator (no API key needed)
    #[arg(long, global = true)]
    pub offline: bool,

    /// Model name for the OpenAI-compatible endpoint
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Review pass threshold (overrides the pipeline default)
    #[arg(long, global = true)]
    pub pass_threshold: Option<f64>,

    /// Maximum rework rounds (overrides the pipeline default)
    #[arg(long, global = true)]
    pub max_revisions: Option<u32>,

    /// Per-run stage execution limit
    #[arg(long, global = true)]
    pub max_steps: Option<usize>,

    /// Session id for support and tutor history
    #[arg(long, global = true)]
    pub session: Option<String>,
}

fn parse_var<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}")),
    }
}

fn is_truthy(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::trim),
        Some("1") | Some("true") | Some("yes")
    )
}

impl Config {
    /// Resolves config from the process environment and `overrides`. Caller
    /// should run `dotenv::dotenv().ok()` before this.
    pub fn from_env_and_args(overrides: &Overrides) -> Result<Self> {
        Self::resolve(|key| std::env::var(key).ok(), overrides)
    }

    /// Offline configuration with every default; ignores the environment.
    pub fn offline() -> Self {
        Self {
            backend: Backend::Offline,
            research_gate: RESEARCH_GATE,
            content_gate: CONTENT_GATE,
            analytic_temperature: 0.0,
            writer_temperature: 0.7,
            creator_temperature: 0.8,
            max_steps: DEFAULT_MAX_STEPS,
            session_id: DEFAULT_SESSION_ID.to_string(),
        }
    }

    /// Same as `from_env_and_args` with an explicit variable lookup.
    ///
    /// CLI overrides win over environment variables, which win over defaults.
    pub fn resolve(env: impl Fn(&str) -> Option<String>, overrides: &Overrides) -> Result<Self> {
        let offline = overrides.offline || is_truthy(env("PIPELINE_OFFLINE"));
        let backend = if offline {
            Backend::Offline
        } else {
            let lookup = |key: &str| match key {
                "OPENAI_MODEL" => overrides.model.clone().or_else(|| env(key)),
                _ => env(key),
            };
            let openai = OpenAiConfig::from_lookup(lookup)
                .map_err(|e| anyhow!("{e} (put OPENAI_API_KEY in .env, or pass --offline)"))?;
            Backend::OpenAi(openai)
        };

        let research_gate = GateSettings {
            threshold: overrides
                .pass_threshold
                .or(parse_var(&env, "RESEARCH_PASS_THRESHOLD")?)
                .unwrap_or(RESEARCH_GATE.threshold),
            max_revisions: overrides
                .max_revisions
                .or(parse_var(&env, "RESEARCH_MAX_REVISIONS")?)
                .unwrap_or(RESEARCH_GATE.max_revisions),
        };
        let content_gate = GateSettings {
            threshold: overrides
                .pass_threshold
                .or(parse_var(&env, "CONTENT_PASS_THRESHOLD")?)
                .unwrap_or(CONTENT_GATE.threshold),
            max_revisions: overrides
                .max_revisions
                .or(parse_var(&env, "CONTENT_MAX_REVISIONS")?)
                .unwrap_or(CONTENT_GATE.max_revisions),
        };
        for gate in [research_gate, content_gate] {
            if !(0.0..=10.0).contains(&gate.threshold) {
                bail!("pass threshold must be within 0..=10, got {}", gate.threshold);
            }
        }

        // Enough for either pipeline to finish its longest revision loop.
        let required = research::step_budget(research_gate.max_revisions)
            .max(content::step_budget(content_gate.max_revisions));
        let max_steps = match overrides
            .max_steps
            .or(parse_var(&env, "PIPELINE_MAX_STEPS")?)
        {
            Some(0) => bail!("max steps must be positive"),
            Some(n) if n < required => bail!(
                "max steps {n} is too low for the revision budgets ({}/{}); need at least {required}",
                research_gate.max_revisions,
                content_gate.max_revisions
            ),
            Some(n) => n,
            None => DEFAULT_MAX_STEPS.max(required),
        };

        let session_id = overrides
            .session
            .clone()
            .or_else(|| env("DEMO_SESSION_ID"))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

        Ok(Self {
            backend,
            research_gate,
            content_gate,
            analytic_temperature: parse_var(&env, "ANALYTIC_TEMPERATURE")?.unwrap_or(0.0),
            writer_temperature: parse_var(&env, "WRITER_TEMPERATURE")?.unwrap_or(0.7),
            creator_temperature: parse_var(&env, "CREATOR_TEMPERATURE")?.unwrap_or(0.8),
            max_steps,
            session_id,
        })
    }
}
