//! Customer-service desk: intent routing, specialist handlers, QA masking.
//!
//! router → faq | order | tech_support | complaint | chitchat → qa_inspector
//!
//! Escalated complaints skip QA and end the turn with a handoff note. Each
//! turn is recorded in the session history so follow-ups see earlier context.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stagegraph::{
    parse_or_fallback, ChatMessage, CompilationError, LlmClient, MessageRole, Pipeline,
    PipelineGraph, PipelineState, SessionHistory, Stage, StageError, StateSchema,
    StateUpdate, ToolRegistry, END, START,
};
use tracing::info;

use crate::config::Config;
use crate::prompts;
use crate::tools;

pub const ROUTER: &str = "router";
pub const FAQ: &str = "faq";
pub const ORDER: &str = "order";
pub const TECH_SUPPORT: &str = "tech_support";
pub const COMPLAINT: &str = "complaint";
pub const CHITCHAT: &str = "chitchat";
pub const QA_INSPECTOR: &str = "qa_inspector";

/// Intent labels the router may produce; each is also the handler's stage name.
pub const INTENTS: [&str; 5] = [FAQ, ORDER, TECH_SUPPORT, COMPLAINT, CHITCHAT];

pub mod fields {
    pub const MESSAGE: &str = "message";
    pub const CONVERSATION: &str = "conversation";
    pub const INTENT: &str = "intent";
    pub const RESPONSE: &str = "response";
    pub const ESCALATED: &str = "escalated";
    pub const QA_RESULT: &str = "qa_result";
    pub const QA_PASSED: &str = "qa_passed";
    pub const DEBUG_INFO: &str = "debug_info";
}

use fields::*;

/// Prior turns shown to handlers.
const CONTEXT_TURNS: usize = 6;

pub const HANDOFF_NOTE: &str =
    "I have passed your case to a senior specialist, who will contact you within 24 hours.";

const FALLBACK_APOLOGY: &str =
    "We are very sorry for the trouble. We have recorded your complaint and will follow up with a solution shortly.";

fn required<'s>(state: &'s PipelineState, field: &str) -> Result<&'s str, StageError> {
    state
        .text(field)
        .ok_or_else(|| StageError::MissingField(field.to_string()))
}

/// Maps a classifier reply to a known intent; anything else is chitchat.
pub fn normalize_intent(raw: &str) -> &'static str {
    let label = raw
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .to_lowercase();
    INTENTS
        .iter()
        .find(|intent| **intent == label)
        .copied()
        .unwrap_or(CHITCHAT)
}

fn conversation_prompt(system: &str, state: &PipelineState, message: &str) -> Vec<ChatMessage> {
    let mut user = String::new();
    if let Some(conversation) = state.text(CONVERSATION) {
        user.push_str(&format!("Earlier in this conversation:\n{conversation}\n\n"));
    }
    user.push_str(&format!("Customer: {message}"));
    ChatMessage::prompt(system, user)
}

struct Router {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for Router {
    fn name(&self) -> &str {
        ROUTER
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let message = required(state, MESSAGE)?;
        let raw = self
            .llm
            .generate(&ChatMessage::prompt(prompts::INTENT_ROUTER, message), self.temperature)
            .await?;
        let intent = normalize_intent(&raw);
        Ok(StateUpdate::new()
            .set(INTENT, intent)
            .push(DEBUG_INFO, format!("router: intent={intent} (raw {:?})", raw.trim())))
    }
}

struct FaqAgent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    temperature: f32,
}

#[async_trait]
impl Stage for FaqAgent {
    fn name(&self) -> &str {
        FAQ
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let message = required(state, MESSAGE)?;
        let answer = self
            .tools
            .execute_text(tools::FAQ_SEARCH, json!({ "question": message }))
            .await?;
        if answer != tools::FAQ_MISS {
            return Ok(StateUpdate::new()
                .set(RESPONSE, answer)
                .push(DEBUG_INFO, "faq: knowledge base hit"));
        }
        let reply = self
            .llm
            .generate(&conversation_prompt(prompts::FAQ_AGENT, state, message), self.temperature)
            .await?;
        Ok(StateUpdate::new()
            .set(RESPONSE, reply)
            .push(DEBUG_INFO, "faq: knowledge base miss, answered by model"))
    }
}

struct OrderAgent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    temperature: f32,
}

#[async_trait]
impl Stage for OrderAgent {
    fn name(&self) -> &str {
        ORDER
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let message = required(state, MESSAGE)?;
        let Some(order_id) = tools::extract_order_id(message) else {
            return Ok(StateUpdate::new()
                .set(RESPONSE, "Could you share your order number so I can look it up?")
                .push(DEBUG_INFO, "order: no order id in message"));
        };
        let order = self
            .tools
            .execute_text(tools::ORDER_STATUS, json!({ "order_id": order_id }))
            .await?;
        let Some(tracking) = tools::tracking_for(&order_id) else {
            return Ok(StateUpdate::new()
                .set(RESPONSE, order)
                .push(DEBUG_INFO, format!("order: {order_id} not found")));
        };
        let logistics = self
            .tools
            .execute_text(tools::LOGISTICS, json!({ "tracking_number": tracking }))
            .await?;
        let prompt = ChatMessage::prompt(
            prompts::ORDER_AGENT,
            format!("Customer: {message}\n\nOrder: {order}\nLogistics: {logistics}"),
        );
        let reply = self.llm.generate(&prompt, self.temperature).await?;
        Ok(StateUpdate::new()
            .set(RESPONSE, reply)
            .push(DEBUG_INFO, format!("order: {order_id} tracked via {tracking}")))
    }
}

struct TechSupport {
    tools: ToolRegistry,
}

#[async_trait]
impl Stage for TechSupport {
    fn name(&self) -> &str {
        TECH_SUPPORT
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let message = required(state, MESSAGE)?;
        let diagnosis = self
            .tools
            .execute_text(tools::DIAGNOSE, json!({ "description": message }))
            .await?;
        Ok(StateUpdate::new()
            .set(RESPONSE, diagnosis)
            .push(DEBUG_INFO, "tech_support: keyword diagnosis"))
    }
}

/// Structured complaint handling decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintDecision {
    pub response: String,
    #[serde(default)]
    pub escalate: bool,
    #[serde(default)]
    pub reason: String,
}

impl ComplaintDecision {
    pub fn apology() -> Self {
        Self {
            response: FALLBACK_APOLOGY.to_string(),
            escalate: false,
            reason: "complaint decision unavailable".to_string(),
        }
    }
}

struct ComplaintAgent {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for ComplaintAgent {
    fn name(&self) -> &str {
        COMPLAINT
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let message = required(state, MESSAGE)?;
        let raw = self
            .llm
            .generate(
                &conversation_prompt(prompts::COMPLAINT_AGENT, state, message),
                self.temperature,
            )
            .await?;
        let decision = parse_or_fallback(COMPLAINT, &raw, ComplaintDecision::apology).into_inner();
        let response = if decision.escalate {
            format!("{}\n\n{HANDOFF_NOTE}", decision.response)
        } else {
            decision.response
        };
        Ok(StateUpdate::new()
            .set(RESPONSE, response)
            .set(ESCALATED, decision.escalate)
            .push(
                DEBUG_INFO,
                format!("complaint: escalate={} ({})", decision.escalate, decision.reason),
            ))
    }
}

struct Chitchat {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for Chitchat {
    fn name(&self) -> &str {
        CHITCHAT
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let message = required(state, MESSAGE)?;
        let reply = self
            .llm
            .generate(
                &conversation_prompt(prompts::CHITCHAT_AGENT, state, message),
                self.temperature,
            )
            .await?;
        Ok(StateUpdate::new()
            .set(RESPONSE, reply)
            .push(DEBUG_INFO, "chitchat: model reply"))
    }
}

struct QaInspector;

#[async_trait]
impl Stage for QaInspector {
    fn name(&self) -> &str {
        QA_INSPECTOR
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let response = required(state, RESPONSE)?;
        let (masked, changed) = tools::mask_sensitive(response);
        let result = if changed {
            "sensitive words masked"
        } else {
            "passed"
        };
        Ok(StateUpdate::new()
            .set(RESPONSE, masked)
            .set(QA_PASSED, !changed)
            .set(QA_RESULT, result)
            .push(DEBUG_INFO, format!("qa_inspector: {result}")))
    }
}

/// Builds the support pipeline.
pub fn build(llm: Arc<dyn LlmClient>, config: &Config) -> Result<Pipeline, CompilationError> {
    let t = config.analytic_temperature;
    let tools = tools::registry();

    let mut graph =
        PipelineGraph::new(StateSchema::new().append(DEBUG_INFO)).with_max_steps(config.max_steps);
    graph
        .add_stage(Router {
            llm: llm.clone(),
            temperature: t,
        })
        .add_stage(FaqAgent {
            llm: llm.clone(),
            tools: tools.clone(),
            temperature: t,
        })
        .add_stage(OrderAgent {
            llm: llm.clone(),
            tools: tools.clone(),
            temperature: t,
        })
        .add_stage(TechSupport { tools })
        .add_stage(ComplaintAgent {
            llm: llm.clone(),
            temperature: t,
        })
        .add_stage(Chitchat {
            llm,
            temperature: config.writer_temperature,
        })
        .add_stage(QaInspector)
        .add_edge(START, ROUTER)
        .add_conditional_edge(ROUTER, INTENTS, |s: &PipelineState| {
            s.str(INTENT).unwrap_or(CHITCHAT).to_string()
        })
        .add_edge(FAQ, QA_INSPECTOR)
        .add_edge(ORDER, QA_INSPECTOR)
        .add_edge(TECH_SUPPORT, QA_INSPECTOR)
        .add_edge(CHITCHAT, QA_INSPECTOR)
        .add_conditional_edge(COMPLAINT, [QA_INSPECTOR], |s: &PipelineState| {
            if s.flag(ESCALATED).unwrap_or(false) {
                END.to_string()
            } else {
                QA_INSPECTOR.to_string()
            }
        })
        .add_edge(QA_INSPECTOR, END);
    graph.compile()
}

/// Result of one customer turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportReply {
    pub intent: String,
    pub response: String,
    pub escalated: bool,
    /// `None` when QA was skipped (escalated complaint).
    pub qa_passed: Option<bool>,
    pub debug_info: Vec<String>,
}

/// Support pipeline plus the session history it answers in.
///
/// **Interaction**: Used by the `support` command; one desk serves many
/// sessions concurrently.
pub struct SupportDesk {
    pipeline: Pipeline,
    history: Arc<dyn SessionHistory>,
}

fn render_turns(turns: &[ChatMessage]) -> String {
    turns
        .iter()
        .map(|t| {
            let who = match t.role {
                MessageRole::User => "Customer",
                MessageRole::Assistant => "Agent",
                MessageRole::System => "System",
            };
            format!("{who}: {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl SupportDesk {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        history: Arc<dyn SessionHistory>,
        config: &Config,
    ) -> Result<Self, CompilationError> {
        Ok(Self {
            pipeline: build(llm, config)?,
            history,
        })
    }

    /// Answers `message` in `session_id` and records the turn.
    pub async fn handle(&self, session_id: &str, message: &str) -> Result<SupportReply> {
        let past = self.history.get(session_id).await?;
        let recent = &past[past.len().saturating_sub(CONTEXT_TURNS)..];
        let initial = PipelineState::new()
            .with(MESSAGE, message)
            .with(CONVERSATION, render_turns(recent));

        let state = self.pipeline.invoke(initial).await?;
        let reply = SupportReply {
            intent: state.str(INTENT).unwrap_or(CHITCHAT).to_string(),
            response: state.str(RESPONSE).unwrap_or_default().to_string(),
            escalated: state.flag(ESCALATED).unwrap_or(false),
            qa_passed: state.flag(QA_PASSED),
            debug_info: state.strings(DEBUG_INFO),
        };
        self.history
            .append(
                session_id,
                &[ChatMessage::user(message), ChatMessage::assistant(reply.response.clone())],
            )
            .await?;
        info!(session = session_id, intent = %reply.intent, escalated = reply.escalated, "support turn");
        Ok(reply)
    }
}
