//! Punny weather assistant: tool lookups, structured reply, conversation memory.
//!
//! locate → forecast
//!
//! `locate` asks the model whether the message is about the weather and for
//! which city, then runs the registered tools: `get_user_location` when no
//! city was named, `get_weather_for_location` for the city. `forecast`
//! answers with a `WeatherReply`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stagegraph::{
    parse_or_fallback, ChatMessage, CompilationError, LlmClient, MessageRole, Pipeline,
    PipelineGraph, PipelineState, SessionHistory, Stage, StageError, StateSchema, StateUpdate,
    ToolRegistry, END, START,
};
use tracing::info;

use crate::config::Config;
use crate::prompts;
use crate::tools;

pub const LOCATE: &str = "locate";
pub const FORECAST: &str = "forecast";

/// User id used by the `weather` command when none is given.
pub const DEFAULT_USER_ID: &str = "1";

pub mod fields {
    pub const MESSAGE: &str = "message";
    pub const USER_ID: &str = "user_id";
    pub const CONVERSATION: &str = "conversation";
    pub const LOCATION: &str = "location";
    pub const WEATHER: &str = "weather";
    pub const REPLY: &str = "reply";
    pub const DEBUG_INFO: &str = "debug_info";
}

use fields::*;

/// Prior turns shown to the forecaster.
const CONTEXT_TURNS: usize = 10;

fn required<'s>(state: &'s PipelineState, field: &str) -> Result<&'s str, StageError> {
    state
        .text(field)
        .ok_or_else(|| StageError::MissingField(field.to_string()))
}

/// Locator decision.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherRequest {
    #[serde(default = "asks_weather")]
    pub needs_weather: bool,
    #[serde(default)]
    pub city: Option<String>,
}

fn asks_weather() -> bool {
    true
}

impl WeatherRequest {
    /// Used when the locator reply is not JSON: look up the user's own weather.
    pub fn own_location() -> Self {
        Self {
            needs_weather: true,
            city: None,
        }
    }
}

/// Structured reply of the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReply {
    pub punny_response: String,
    #[serde(default)]
    pub weather_conditions: Option<String>,
}

/// Locator system prompt followed by the registry's tools.
pub fn locator_prompt(tools: &ToolRegistry) -> String {
    let mut prompt = format!("{}\n\nTools:", prompts::WEATHER_LOCATOR);
    for spec in tools.specs() {
        let args: Vec<&str> = spec.parameters["properties"]
            .as_object()
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default();
        prompt.push_str(&format!(
            "\n- {}({}): {}",
            spec.name,
            args.join(", "),
            spec.description
        ));
    }
    prompt
}

struct Locate {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    system: String,
    temperature: f32,
}

#[async_trait]
impl Stage for Locate {
    fn name(&self) -> &str {
        LOCATE
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let message = required(state, MESSAGE)?;
        let raw = self
            .llm
            .generate(&ChatMessage::prompt(&self.system, message), self.temperature)
            .await?;
        let request = parse_or_fallback(LOCATE, &raw, WeatherRequest::own_location).into_inner();
        if !request.needs_weather {
            return Ok(StateUpdate::new().push(DEBUG_INFO, "locate: no weather lookup needed"));
        }

        let mut update = StateUpdate::new();
        let city = match request.city.filter(|c| !c.trim().is_empty()) {
            Some(city) => city,
            None => {
                let user_id = required(state, USER_ID)?;
                let city = self
                    .tools
                    .execute_text(tools::USER_LOCATION, json!({ "user_id": user_id }))
                    .await?;
                update = update.push(
                    DEBUG_INFO,
                    format!("{}: user {user_id} is in {city}", tools::USER_LOCATION),
                );
                city
            }
        };
        let weather = self
            .tools
            .execute_text(tools::WEATHER, json!({ "city": city }))
            .await?;
        Ok(update
            .set(LOCATION, city.as_str())
            .set(WEATHER, weather.as_str())
            .push(DEBUG_INFO, format!("{}: {weather}", tools::WEATHER)))
    }
}

struct Forecast {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

#[async_trait]
impl Stage for Forecast {
    fn name(&self) -> &str {
        FORECAST
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let message = required(state, MESSAGE)?;
        let mut user = String::new();
        if let Some(conversation) = state.text(CONVERSATION) {
            user.push_str(&format!("Earlier in this conversation:\n{conversation}\n\n"));
        }
        if let Some(weather) = state.text(WEATHER) {
            user.push_str(&format!("Tool result: {weather}\n\n"));
        }
        user.push_str(&format!("User: {message}"));

        let raw = self
            .llm
            .generate(
                &ChatMessage::prompt(prompts::WEATHER_FORECASTER, user),
                self.temperature,
            )
            .await?;
        let conditions = state.text(WEATHER).map(str::to_string);
        let reply = parse_or_fallback(FORECAST, &raw, || WeatherReply {
            punny_response: raw.trim().to_string(),
            weather_conditions: conditions,
        })
        .into_inner();
        StateUpdate::new()
            .push(DEBUG_INFO, "forecast: reply ready")
            .set_serialized(REPLY, &reply)
            .map_err(|e| StageError::Failed(e.to_string()))
    }
}

/// Builds the weather pipeline over `tools`.
pub fn build(
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    config: &Config,
) -> Result<Pipeline, CompilationError> {
    let mut graph =
        PipelineGraph::new(StateSchema::new().append(DEBUG_INFO)).with_max_steps(config.max_steps);
    graph
        .add_stage(Locate {
            llm: llm.clone(),
            system: locator_prompt(&tools),
            tools,
            temperature: config.analytic_temperature,
        })
        .add_stage(Forecast {
            llm,
            temperature: config.analytic_temperature,
        })
        .add_edge(START, LOCATE)
        .add_edge(LOCATE, FORECAST)
        .add_edge(FORECAST, END);
    graph.compile()
}

/// Result of one weather turn.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherTurn {
    pub reply: WeatherReply,
    pub location: Option<String>,
    pub debug_info: Vec<String>,
}

/// Weather pipeline plus the session history it answers in.
///
/// **Interaction**: Used by the `weather` command.
pub struct WeatherDesk {
    pipeline: Pipeline,
    history: Arc<dyn SessionHistory>,
}

fn render_turns(turns: &[ChatMessage]) -> String {
    turns
        .iter()
        .map(|t| {
            let who = match t.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Forecaster",
                MessageRole::System => "System",
            };
            format!("{who}: {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl WeatherDesk {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        history: Arc<dyn SessionHistory>,
        config: &Config,
    ) -> Result<Self, CompilationError> {
        Ok(Self {
            pipeline: build(llm, tools::registry(), config)?,
            history,
        })
    }

    /// Answers `message` from `user_id` in `session_id` and records the turn.
    pub async fn handle(&self, session_id: &str, user_id: &str, message: &str) -> Result<WeatherTurn> {
        let past = self.history.get(session_id).await?;
        let recent = &past[past.len().saturating_sub(CONTEXT_TURNS)..];
        let initial = PipelineState::new()
            .with(MESSAGE, message)
            .with(USER_ID, user_id)
            .with(CONVERSATION, render_turns(recent));

        let state = self.pipeline.invoke(initial).await?;
        let reply: WeatherReply = state
            .get_as(REPLY)
            .ok_or_else(|| anyhow::anyhow!("forecast produced no reply"))?;
        self.history
            .append(
                session_id,
                &[
                    ChatMessage::user(message),
                    ChatMessage::assistant(reply.punny_response.clone()),
                ],
            )
            .await?;
        info!(session = session_id, user = user_id, "weather turn recorded");
        Ok(WeatherTurn {
            reply,
            location: state.str(LOCATION).map(str::to_string),
            debug_info: state.strings(DEBUG_INFO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagegraph::{InMemoryHistory, MockLlm};

    const PUN: &str = r#"{"punny_response": "Florida is having a ray-diant day!", "weather_conditions": "sunny"}"#;

    fn desk(llm: Arc<MockLlm>) -> (WeatherDesk, Arc<InMemoryHistory>) {
        let history = Arc::new(InMemoryHistory::new());
        let desk = WeatherDesk::new(llm, history.clone(), &Config::offline()).unwrap();
        (desk, history)
    }

    #[test]
    fn locator_prompt_lists_weather_tools() {
        let prompt = locator_prompt(&tools::registry());
        assert!(prompt.starts_with(prompts::WEATHER_LOCATOR));
        assert!(prompt.contains("\n- get_user_location(user_id): "));
        assert!(prompt.contains("\n- get_weather_for_location(city): Gets the weather for a city"));
    }

    #[tokio::test]
    async fn own_location_is_looked_up_by_user_id() {
        let llm = Arc::new(
            MockLlm::fixed("unused")
                .on("weather request planner", r#"{"needs_weather": true, "city": null}"#)
                .on("speaks in puns. Answer", PUN),
        );
        let (desk, _) = desk(llm.clone());
        let turn = desk.handle("t1", "1", "What's the weather outside?").await.unwrap();
        assert_eq!(turn.location.as_deref(), Some("Florida"));
        assert_eq!(turn.reply.weather_conditions.as_deref(), Some("sunny"));
        assert_eq!(turn.debug_info.len(), 3);

        let forecast = llm.requests().await.pop().unwrap();
        assert!(forecast.messages[1]
            .content
            .contains("Tool result: Florida is always sunny!"));

        let turn = desk.handle("t2", "7", "weather here?").await.unwrap();
        assert_eq!(turn.location.as_deref(), Some("SF"));
    }

    #[tokio::test]
    async fn named_city_skips_user_lookup() {
        let llm = Arc::new(
            MockLlm::fixed("unused")
                .on("weather request planner", r#"{"needs_weather": true, "city": "Paris"}"#)
                .on("speaks in puns. Answer", PUN),
        );
        let (desk, _) = desk(llm);
        let turn = desk.handle("t", "1", "Weather in Paris?").await.unwrap();
        assert_eq!(turn.location.as_deref(), Some("Paris"));
        assert!(turn.debug_info.iter().all(|l| !l.starts_with(tools::USER_LOCATION)));
    }

    #[tokio::test]
    async fn follow_up_sees_history_and_plain_reply_falls_back() {
        let llm = Arc::new(
            MockLlm::fixed("unused")
                .on_sequence(
                    "weather request planner",
                    [r#"{"needs_weather": true}"#, r#"{"needs_weather": false}"#],
                )
                .on_sequence("speaks in puns. Answer", [PUN, "You're welcome, sunshine!"]),
        );
        let (desk, history) = desk(llm.clone());
        desk.handle("t", "1", "How is the weather?").await.unwrap();
        let turn = desk.handle("t", "1", "Thanks!").await.unwrap();

        assert_eq!(turn.reply.punny_response, "You're welcome, sunshine!");
        assert_eq!(turn.reply.weather_conditions, None);
        assert_eq!(turn.location, None);

        let forecast = llm.requests().await.pop().unwrap();
        assert!(forecast.messages[1]
            .content
            .contains("Forecaster: Florida is having a ray-diant day!"));
        assert_eq!(history.get("t").await.unwrap().len(), 4);
    }
}
