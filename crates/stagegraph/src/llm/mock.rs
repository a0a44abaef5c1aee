//! Scripted generation client for tests and offline runs.
//!
//! Replies are chosen by substring rules over the prompt; each rule holds a
//! queue of replies and repeats its last one once the queue is drained.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use super::client::{DeltaStream, LlmClient, TextStream};
use super::error::LlmError;
use super::types::{ChatMessage, MessageRole, StreamDelta};

/// One call as seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

enum Unmatched {
    Fixed(String),
    Echo,
    Fail(String),
}

struct Rule {
    needle: String,
    replies: Mutex<VecDeque<String>>,
}

/// Mock LLM: substring rules, a default reply, and a request log.
///
/// A rule matches when its needle occurs in any message of the prompt; the
/// first matching rule (in insertion order) answers. Unmatched prompts get
/// the default: fixed text, an echo of the last user message, or an error.
///
/// **Interaction**: Implements `LlmClient`; used by stage tests, the chat
/// tests and the demo's offline mode.
pub struct MockLlm {
    rules: Vec<Rule>,
    default: Unmatched,
    chunk_chars: usize,
    reasoning: Option<String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockLlm {
    fn with_default(default: Unmatched) -> Self {
        Self {
            rules: Vec::new(),
            default,
            chunk_chars: 8,
            reasoning: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always replies `text` unless a rule matches.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::with_default(Unmatched::Fixed(text.into()))
    }

    /// Replies with the last user message unless a rule matches.
    pub fn echo() -> Self {
        Self::with_default(Unmatched::Echo)
    }

    /// Fails every unmatched call with `LlmError::Unavailable`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_default(Unmatched::Fail(reason.into()))
    }

    /// Queues `reply` for prompts containing `needle`. Repeated calls with the
    /// same needle build a sequence.
    pub fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        let needle = needle.into();
        let reply = reply.into();
        match self.rules.iter_mut().find(|r| r.needle == needle) {
            Some(rule) => rule.replies.get_mut().push_back(reply),
            None => self.rules.push(Rule {
                needle,
                replies: Mutex::new(VecDeque::from([reply])),
            }),
        }
        self
    }

    /// Queues every reply in `replies` for `needle`, in order.
    pub fn on_sequence<I, S>(self, needle: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let needle = needle.into();
        replies
            .into_iter()
            .fold(self, |mock, reply| mock.on(needle.clone(), reply))
    }

    /// Size of the increments produced by `stream_generate`, in characters.
    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    /// Reasoning text streamed by `stream_deltas` ahead of every answer.
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Every call received so far, oldest first.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn reply_for(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        for rule in &self.rules {
            if messages.iter().any(|m| m.content.contains(&rule.needle)) {
                let mut replies = rule.replies.lock().await;
                let reply = if replies.len() > 1 {
                    replies.pop_front()
                } else {
                    replies.front().cloned()
                };
                return Ok(reply.unwrap_or_default());
            }
        }
        match &self.default {
            Unmatched::Fixed(text) => Ok(text.clone()),
            Unmatched::Echo => Ok(messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::User)
                .map(|m| m.content.clone())
                .unwrap_or_default()),
            Unmatched::Fail(reason) => Err(LlmError::Unavailable(reason.clone())),
        }
    }
}

fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars)
        .map(|c| c.iter().collect())
        .collect()
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError> {
        self.requests.lock().await.push(RecordedRequest {
            messages: messages.to_vec(),
            temperature,
        });
        self.reply_for(messages).await
    }

    fn stream_generate(&self, messages: Vec<ChatMessage>, temperature: f32) -> TextStream<'_> {
        let chunk_chars = self.chunk_chars;
        Box::pin(
            stream::once(async move { self.generate(&messages, temperature).await }).flat_map(
                move |result| {
                    let items: Vec<Result<String, LlmError>> = match result {
                        Ok(text) => chunk_text(&text, chunk_chars).into_iter().map(Ok).collect(),
                        Err(e) => vec![Err(e)],
                    };
                    stream::iter(items)
                },
            ),
        )
    }

    fn stream_deltas(&self, messages: Vec<ChatMessage>, temperature: f32) -> DeltaStream<'_> {
        let reasoning: Vec<Result<StreamDelta, LlmError>> = self
            .reasoning
            .as_deref()
            .map(|r| chunk_text(r, self.chunk_chars))
            .unwrap_or_default()
            .into_iter()
            .map(|chunk| Ok(StreamDelta::Reasoning(chunk)))
            .collect();
        Box::pin(
            stream::iter(reasoning).chain(
                self.stream_generate(messages, temperature)
                    .map(|item| item.map(StreamDelta::Text)),
            ),
        )
    }
}
