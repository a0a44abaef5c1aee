//! OpenAI-compatible generation client (Chat Completions API).

use std::fmt;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::{DeltaStream, LlmClient, TextStream};
use super::error::LlmError;
use super::types::{ChatMessage, MessageRole, StreamDelta};

/// Endpoint, credentials and model.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Usually from `OPENAI_API_KEY`.
    pub api_key: String,
    /// Defaults to `https://api.openai.com/v1`; any compatible endpoint works.
    pub base_url: String,
    /// Model id, e.g. `gpt-4o-mini`.
    pub model: String,
}

impl OpenAiConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    /// Reads `OPENAI_API_KEY` (required, non-blank), `OPENAI_BASE_URL` and
    /// `OPENAI_MODEL` through `lookup`, e.g. `|k| std::env::var(k).ok()`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::Auth("OPENAI_API_KEY not set or empty".to_string()))?;
        let base_url = lookup("OPENAI_BASE_URL").unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string());
        let model = lookup("OPENAI_MODEL").unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());
        Ok(Self::new(api_key, base_url, model))
    }

    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct Response {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageOut,
}

#[derive(Debug, Deserialize)]
struct MessageOut {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    /// Exposed by reasoning models on some compatible endpoints.
    reasoning_content: Option<String>,
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn status_error(status: u16, body: String) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth(body),
        429 => LlmError::RateLimit(body),
        400..=499 => LlmError::InvalidRequest(body),
        _ => LlmError::ApiError(body),
    }
}

/// Payload of one server-sent event.
#[derive(Debug, PartialEq)]
enum SseData {
    Deltas(Vec<StreamDelta>),
    Done,
}

fn parse_sse_data(data: &str) -> Result<SseData, LlmError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseData::Done);
    }
    if data.is_empty() {
        return Ok(SseData::Deltas(Vec::new()));
    }
    let chunk: Chunk =
        serde_json::from_str(data).map_err(|e| LlmError::Parsing(format!("{e}: {data}")))?;
    let mut deltas = Vec::new();
    if let Some(delta) = chunk.choices.into_iter().next().map(|c| c.delta) {
        if let Some(reasoning) = delta.reasoning_content.filter(|s| !s.is_empty()) {
            deltas.push(StreamDelta::Reasoning(reasoning));
        }
        if let Some(text) = delta.content.filter(|s| !s.is_empty()) {
            deltas.push(StreamDelta::Text(text));
        }
    }
    Ok(SseData::Deltas(deltas))
}

/// Decodes an SSE body into deltas, ending at `[DONE]`.
///
/// Event framing and UTF-8 decoding across chunk boundaries are done by
/// `eventsource_stream`.
fn sse_deltas<'a, S, B, E>(body: S) -> DeltaStream<'a>
where
    S: Stream<Item = Result<B, E>> + Send + 'a,
    B: AsRef<[u8]> + Send + 'a,
    E: fmt::Display + Send + 'a,
{
    body.eventsource()
        .map(|event| match event {
            Ok(ev) => parse_sse_data(&ev.data),
            Err(e) => Err(LlmError::StreamClosed(e.to_string())),
        })
        .take_while(|item| future::ready(!matches!(item, Ok(SseData::Done))))
        .flat_map(|item| {
            let items: Vec<Result<StreamDelta, LlmError>> = match item {
                Ok(SseData::Deltas(deltas)) => deltas.into_iter().map(Ok).collect(),
                Ok(SseData::Done) => Vec::new(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        })
        .boxed()
}

/// Chat Completions client over `reqwest`.
///
/// **Interaction**: Implements `LlmClient`; built by the demo when an API key
/// is configured.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn request(&self, messages: &[ChatMessage], temperature: f32, stream: bool) -> reqwest::RequestBuilder {
        let body = RequestBody {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| RequestMessage {
                    role: role_str(m.role),
                    content: &m.content,
                })
                .collect(),
            temperature,
            stream,
        };
        self.client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError> {
        debug!(model = %self.config.model, messages = messages.len(), "chat completion");
        let res = self
            .request(messages, temperature, false)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), text));
        }
        let parsed: Response =
            serde_json::from_str(&text).map_err(|e| LlmError::Parsing(format!("{e}: {text}")))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn stream_deltas(&self, messages: Vec<ChatMessage>, temperature: f32) -> DeltaStream<'_> {
        let request = self.request(&messages, temperature, true);
        let connect = async move {
            let res = request
                .send()
                .await
                .map_err(|e| LlmError::Network(e.to_string()))?;
            let status = res.status();
            if !status.is_success() {
                let body = res.text().await.unwrap_or_default();
                return Err(status_error(status.as_u16(), body));
            }
            Ok(sse_deltas(res.bytes_stream()))
        };
        Box::pin(stream::once(connect).flat_map(|opened| match opened {
            Ok(deltas) => deltas,
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        }))
    }

    fn stream_generate(&self, messages: Vec<ChatMessage>, temperature: f32) -> TextStream<'_> {
        Box::pin(self.stream_deltas(messages, temperature).filter_map(|item| {
            future::ready(match item {
                Ok(StreamDelta::Text(text)) => Some(Ok(text)),
                Ok(StreamDelta::Reasoning(_)) => None,
                Err(e) => Some(Err(e)),
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    fn body(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Send {
        stream::iter(parts.into_iter().map(Ok))
    }

    async fn collect(parts: Vec<Vec<u8>>) -> Vec<StreamDelta> {
        sse_deltas(body(parts)).map(|d| d.unwrap()).collect().await
    }

    #[test]
    fn sse_data_delta_and_done() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(
            parse_sse_data(data).unwrap(),
            SseData::Deltas(vec![StreamDelta::Text("Hel".into())])
        );
        assert_eq!(parse_sse_data("[DONE]").unwrap(), SseData::Done);
        assert_eq!(
            parse_sse_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseData::Deltas(Vec::new())
        );
    }

    #[test]
    fn sse_garbage_is_parse_error() {
        assert!(matches!(
            parse_sse_data("{not json"),
            Err(LlmError::Parsing(_))
        ));
    }

    #[tokio::test]
    async fn multibyte_text_split_across_chunks() {
        let raw = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n\ndata: [DONE]\n\n"
            .as_bytes()
            .to_vec();
        // Cut inside the three bytes of the first character.
        let cut = raw.iter().position(|&b| b == 0xE4).unwrap() + 1;
        let deltas = collect(vec![raw[..cut].to_vec(), raw[cut..].to_vec()]).await;
        assert_eq!(deltas, vec![StreamDelta::Text("你好".into())]);
    }

    #[tokio::test]
    async fn reasoning_precedes_text_and_done_ends_stream() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"think\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        );
        let deltas = collect(vec![raw.as_bytes().to_vec()]).await;
        assert_eq!(
            deltas,
            vec![
                StreamDelta::Reasoning("think".into()),
                StreamDelta::Text("answer".into())
            ]
        );
    }

    #[test]
    fn config_from_lookup_requires_key() {
        let err = OpenAiConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));
        let err = OpenAiConfig::from_lookup(|k| (k == "OPENAI_API_KEY").then(|| "  ".to_string()))
            .unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));

        let cfg = OpenAiConfig::from_lookup(|k| match k {
            "OPENAI_API_KEY" => Some("sk".to_string()),
            "OPENAI_MODEL" => Some("m".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.base_url, OpenAiConfig::DEFAULT_BASE_URL);
        assert_eq!(cfg.model, "m");
    }

    #[test]
    fn status_codes_map_to_errors() {
        assert!(matches!(status_error(401, String::new()), LlmError::Auth(_)));
        assert!(matches!(status_error(429, String::new()), LlmError::RateLimit(_)));
        assert!(matches!(status_error(400, String::new()), LlmError::InvalidRequest(_)));
        assert!(matches!(status_error(503, String::new()), LlmError::ApiError(_)));
    }

    #[test]
    fn config_trims_base_url() {
        let cfg = OpenAiConfig::new(" key ", "https://example.test/v1/", "m");
        assert_eq!(cfg.api_key, "key");
        assert_eq!(cfg.base_url, "https://example.test/v1");
    }
}
