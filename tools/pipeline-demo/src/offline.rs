//! Scripted generator for `--offline` runs.
//!
//! Replies are keyed on the role named in each system prompt. The research
//! and content reviewers fail the first draft and pass the revision so the
//! review loop is visible. Intent classification and weather requests use
//! keywords. Streamed tutor replies carry a short reasoning trace.

use async_trait::async_trait;
use serde_json::json;
use stagegraph::{
    ChatMessage, DeltaStream, LlmClient, LlmError, MessageRole, MockLlm, TextStream,
};

use crate::prompts;

const PLAN: &str = r#"["What is the current market size and adoption?",
"Which technologies drive progress?",
"What are the main risks and open problems?"]"#;

const FIRST_REVIEW: &str = r#"```json
{"scores": {"logic": 7, "evidence": 5, "completeness": 6, "readability": 8},
 "overall_score": 6, "passed": false,
 "feedback": "Back the market claims with figures and add a risks section with concrete examples."}
```"#;

const SECOND_REVIEW: &str = r#"{"scores": {"logic": 8, "evidence": 8, "completeness": 8, "readability": 9},
 "overall_score": 8.5, "passed": true, "feedback": "Clear, well supported report."}"#;

const FIRST_EDIT: &str = r#"{"scores": {"accuracy": 8, "readability": 7, "engagement": 6, "seo": 7},
 "overall_score": 7, "passed": false, "feedback": "Open with a stronger hook and use the suggested keywords in headings."}"#;

const SECOND_EDIT: &str = r#"{"scores": {"accuracy": 9, "readability": 8, "engagement": 8, "seo": 8},
 "overall_score": 8.5, "passed": true, "feedback": "Ready to publish."}"#;

const FACT_CHECK: &str = r#"{"issues": [{"location": "paragraph 2", "problem": "growth figure has no source", "severity": "low"}],
 "overall": "Mostly accurate; one figure needs a citation.", "passed": true}"#;

const PLATFORMS: &str = r#"{"wechat": {"title": "The complete guide", "summary": "Everything you need in five minutes.", "content": "Long-form article for subscribers."},
 "weibo": {"title": "Quick take", "content": "Three things to know today. #trending"},
 "xiaohongshu": {"title": "My honest notes", "content": "Saving this for later! Tips inside #guide #notes"}}"#;

const COMPLAINT: &str = r#"{"response": "I am truly sorry about this experience. I have issued a coupon to your account as an apology.",
 "escalate": false, "reason": "customer is upset but not asking for escalation"}"#;

/// Keyword intent classifier used in place of a model.
pub fn classify(message: &str) -> &'static str {
    let m = message.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| m.contains(w));
    if has(&["complain", "terrible", "angry", "manager", "worst"]) {
        "complaint"
    } else if has(&["order", "parcel", "delivery", "tracking"]) {
        "order"
    } else if has(&["login", "crash", "slow", "error", "bug"]) {
        "tech_support"
    } else if has(&["return", "exchange", "invoice", "coupon", "membership", "shipping"]) {
        "faq"
    } else {
        "chitchat"
    }
}

const FORECAST: &str = r#"{"punny_response": "Looks like the sun is really showing off today. It's a ray-diant forecast, no matter whether you like it or not!",
 "weather_conditions": "Clear skies all day."}"#;

const TUTOR_REASONING: &str = "The learner wants an explanation. Start from the core idea, \
give one concrete example, then check understanding.";

/// Keyword weather-request parser used in place of a model: a city after
/// " in " is used as named, otherwise the user's own location is meant.
pub fn locate(message: &str) -> String {
    let lower = message.to_lowercase();
    let about_weather = ["weather", "temperature", "sunny", "rain", "forecast", "hot", "cold"]
        .iter()
        .any(|w| lower.contains(w));
    if !about_weather {
        return json!({ "needs_weather": false, "city": null }).to_string();
    }
    let city = message
        .find(" in ")
        .and_then(|at| message.get(at + 4..))
        .map(|rest| {
            rest.split_whitespace()
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
                .take_while(|w| w.chars().next().is_some_and(char::is_uppercase))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|city| !city.is_empty());
    json!({ "needs_weather": true, "city": city }).to_string()
}

/// Offline stand-in for a hosted model.
///
/// **Interaction**: Built by `main` when the backend is `Backend::Offline`.
pub struct OfflineLlm {
    scripted: MockLlm,
}

impl Default for OfflineLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineLlm {
    pub fn new() -> Self {
        let scripted = MockLlm::fixed(
            "Here is a step-by-step explanation. First, the core idea in one sentence. \
             Then a simple example. Finally, a quick question to check your understanding.",
        )
        .with_chunk_chars(12)
        .with_reasoning(TUTOR_REASONING)
        .on("speaks in puns. Answer", FORECAST)
        .on("research planner", PLAN)
        .on_sequence("report reviewer", [FIRST_REVIEW, SECOND_REVIEW])
        .on_sequence("chief editor", [FIRST_EDIT, SECOND_EDIT])
        .on("fact checker", FACT_CHECK)
        .on("platform adapter", PLATFORMS)
        .on("complaint handler", COMPLAINT)
        .on(
            "You are a researcher",
            "Adoption grew about 18% last year; three vendors lead the market (web, market data).",
        )
        .on(
            "You are an analyst",
            "Key insights: growth is strong, cost is the main barrier, regulation is still unsettled.",
        )
        .on(
            "You are a report writer",
            "# Report\n\n## Executive summary\nStrong growth with cost and regulation as open questions.\n\n## Outlook\nSteady expansion expected.",
        )
        .on(
            "You are a content creator",
            "# Five things to know\n\nShort, concrete paragraphs with examples and numbers.",
        )
        .on(
            "You are an SEO optimizer",
            "Title: add the main keyword. Keywords: guide, tips, 2026. Meta: one-sentence promise.",
        )
        .on(
            "You are an order support agent",
            "Your order has shipped and is on its way; see the tracking details above.",
        );
        Self { scripted }
    }

    /// Keyword answer for the intent router and the weather locator.
    fn keyword_reply(messages: &[ChatMessage]) -> Option<String> {
        let system = messages.first().filter(|m| m.role == MessageRole::System)?;
        let user = messages.iter().rev().find(|m| m.role == MessageRole::User)?;
        if system.content == prompts::INTENT_ROUTER {
            Some(classify(&user.content).to_string())
        } else if system.content.starts_with(prompts::WEATHER_LOCATOR) {
            Some(locate(&user.content))
        } else {
            None
        }
    }
}

#[async_trait]
impl LlmClient for OfflineLlm {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError> {
        match Self::keyword_reply(messages) {
            Some(reply) => Ok(reply),
            None => self.scripted.generate(messages, temperature).await,
        }
    }

    fn stream_generate(&self, messages: Vec<ChatMessage>, temperature: f32) -> TextStream<'_> {
        self.scripted.stream_generate(messages, temperature)
    }

    fn stream_deltas(&self, messages: Vec<ChatMessage>, temperature: f32) -> DeltaStream<'_> {
        self.scripted.stream_deltas(messages, temperature)
    }
}
