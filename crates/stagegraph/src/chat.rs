//! History-backed conversational turns.
//!
//! Each turn sends `system + recent history + user` to the generator and
//! records the user and assistant turns under the session id once the reply
//! is complete.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tracing::{debug, info};

use crate::llm::{ChatMessage, DeltaStream, LlmClient, LlmError, StreamDelta};
use crate::memory::{HistoryError, SessionHistory};

/// Errors from a chat turn.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("history: {0}")]
    History(#[from] HistoryError),

    #[error("empty message")]
    EmptyMessage,
}

/// Cumulative state of a streamed turn. `reasoning` is shown to the user
/// but never written to history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatPartial {
    pub reasoning: String,
    pub answer: String,
}

/// Chat front-end over an `LlmClient` and a `SessionHistory`.
///
/// **Interaction**: Used by the tutor command of the demo; the customer
/// support desk records its turns in the same kind of store.
pub struct HistoryChat {
    llm: Arc<dyn LlmClient>,
    history: Arc<dyn SessionHistory>,
    system_prompt: String,
    temperature: f32,
    history_limit: Option<usize>,
}

enum Phase<'a> {
    Start,
    Streaming {
        inner: DeltaStream<'a>,
        partial: ChatPartial,
    },
    Done,
}

impl HistoryChat {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        history: Arc<dyn SessionHistory>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            history,
            system_prompt: system_prompt.into(),
            temperature: 0.7,
            history_limit: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sends at most the newest `turns` history turns with each prompt.
    pub fn with_history_limit(mut self, turns: usize) -> Self {
        self.history_limit = Some(turns);
        self
    }

    pub fn history(&self) -> &Arc<dyn SessionHistory> {
        &self.history
    }

    /// Forgets every turn of `session_id`.
    pub async fn reset(&self, session_id: &str) -> Result<(), ChatError> {
        self.history.clear(session_id).await?;
        info!(session = session_id, "chat history cleared");
        Ok(())
    }

    async fn prompt(&self, session_id: &str, user_text: &str) -> Result<Vec<ChatMessage>, ChatError> {
        if user_text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let past = self.history.get(session_id).await?;
        let skip = self
            .history_limit
            .map_or(0, |limit| past.len().saturating_sub(limit));
        debug!(session = session_id, turns = past.len() - skip, "building chat prompt");

        let mut messages = Vec::with_capacity(past.len() - skip + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(past.into_iter().skip(skip));
        messages.push(ChatMessage::user(user_text));
        Ok(messages)
    }

    async fn record(&self, session_id: &str, user_text: &str, reply: &str) -> Result<(), ChatError> {
        self.history
            .append(
                session_id,
                &[ChatMessage::user(user_text), ChatMessage::assistant(reply)],
            )
            .await?;
        info!(session = session_id, reply_chars = reply.chars().count(), "chat turn recorded");
        Ok(())
    }

    /// Full reply for one turn.
    pub async fn reply(&self, session_id: &str, user_text: &str) -> Result<String, ChatError> {
        let messages = self.prompt(session_id, user_text).await?;
        let reply = self.llm.generate(&messages, self.temperature).await?;
        self.record(session_id, user_text, &reply).await?;
        Ok(reply)
    }

    /// Streams the reply cumulatively: every item holds the whole reasoning
    /// and answer so far. Only the answer is written to history, after the
    /// last increment; a failed turn records nothing.
    pub fn reply_stream<'a>(
        &'a self,
        session_id: &'a str,
        user_text: &'a str,
    ) -> BoxStream<'a, Result<ChatPartial, ChatError>> {
        stream::unfold(Phase::Start, move |mut phase| async move {
            loop {
                match phase {
                    Phase::Done => return None,
                    Phase::Start => match self.prompt(session_id, user_text).await {
                        Ok(messages) => {
                            phase = Phase::Streaming {
                                inner: self.llm.stream_deltas(messages, self.temperature),
                                partial: ChatPartial::default(),
                            }
                        }
                        Err(e) => return Some((Err(e), Phase::Done)),
                    },
                    Phase::Streaming {
                        mut inner,
                        mut partial,
                    } => {
                        return match inner.next().await {
                            Some(Ok(delta)) => {
                                match delta {
                                    StreamDelta::Reasoning(r) => partial.reasoning.push_str(&r),
                                    StreamDelta::Text(t) => partial.answer.push_str(&t),
                                }
                                Some((Ok(partial.clone()), Phase::Streaming { inner, partial }))
                            }
                            Some(Err(e)) => Some((Err(e.into()), Phase::Done)),
                            None => match self.record(session_id, user_text, &partial.answer).await {
                                Ok(()) => None,
                                Err(e) => Some((Err(e), Phase::Done)),
                            },
                        }
                    }
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MessageRole, MockLlm};
    use crate::memory::InMemoryHistory;

    fn chat(llm: Arc<MockLlm>, history: Arc<InMemoryHistory>) -> HistoryChat {
        HistoryChat::new(llm, history, "You are a patient tutor.")
    }

    #[tokio::test]
    async fn reply_records_both_turns() {
        let llm = Arc::new(MockLlm::fixed("Photosynthesis turns light into sugar."));
        let history = Arc::new(InMemoryHistory::new());
        let c = chat(llm.clone(), history.clone());

        let reply = c.reply("s1", "What is photosynthesis?").await.unwrap();
        assert_eq!(reply, "Photosynthesis turns light into sugar.");
        let turns = history.get("s1").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, MessageRole::User);
        assert_eq!(turns[1].content, reply);
    }

    #[tokio::test]
    async fn prompt_includes_prior_turns() {
        let llm = Arc::new(MockLlm::echo());
        let history = Arc::new(InMemoryHistory::new());
        let c = chat(llm.clone(), history.clone());
        c.reply("s1", "first").await.unwrap();
        c.reply("s1", "second").await.unwrap();

        let last = llm.requests().await.pop().unwrap();
        let contents: Vec<_> = last.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["You are a patient tutor.", "first", "first", "second"]
        );
    }

    #[tokio::test]
    async fn history_limit_trims_prompt() {
        let llm = Arc::new(MockLlm::echo());
        let history = Arc::new(InMemoryHistory::new());
        let c = chat(llm.clone(), history.clone()).with_history_limit(2);
        for text in ["a", "b", "c"] {
            c.reply("s", text).await.unwrap();
        }
        let last = llm.requests().await.pop().unwrap();
        assert_eq!(last.messages.len(), 4);
        assert_eq!(last.messages[1].content, "b");
    }

    #[tokio::test]
    async fn stream_yields_cumulative_text_then_records() {
        let llm = Arc::new(MockLlm::fixed("abcdefghij").with_chunk_chars(4));
        let history = Arc::new(InMemoryHistory::new());
        let c = chat(llm, history.clone());

        let partials: Vec<String> = c
            .reply_stream("s", "letters?")
            .map(|r| r.unwrap().answer)
            .collect()
            .await;
        assert_eq!(partials, vec!["abcd", "abcdefgh", "abcdefghij"]);
        let turns = history.get("s").await.unwrap();
        assert_eq!(turns[1], ChatMessage::assistant("abcdefghij"));
    }

    #[tokio::test]
    async fn reasoning_is_shown_but_not_recorded() {
        let llm = Arc::new(
            MockLlm::fixed("42")
                .with_reasoning("six times seven")
                .with_chunk_chars(8),
        );
        let history = Arc::new(InMemoryHistory::new());
        let c = chat(llm, history.clone());

        let partials: Vec<ChatPartial> = c
            .reply_stream("s", "answer?")
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(partials[0].reasoning, "six time");
        assert!(partials[0].answer.is_empty());
        let last = partials.last().unwrap();
        assert_eq!(last.reasoning, "six times seven");
        assert_eq!(last.answer, "42");

        let turns = history.get("s").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1], ChatMessage::assistant("42"));
        assert!(turns.iter().all(|t| !t.content.contains("six")));
    }

    #[tokio::test]
    async fn reset_forgets_session() {
        let history = Arc::new(InMemoryHistory::new());
        let c = chat(Arc::new(MockLlm::echo()), history.clone());
        c.reply("s", "hello").await.unwrap();
        c.reply("t", "other").await.unwrap();
        c.reset("s").await.unwrap();
        assert!(history.get("s").await.unwrap().is_empty());
        assert_eq!(history.get("t").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_stream_records_nothing() {
        let history = Arc::new(InMemoryHistory::new());
        let c = chat(Arc::new(MockLlm::failing("down")), history.clone());
        let items: Vec<_> = c.reply_stream("s", "hi").collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ChatError::Llm(_))));
        assert!(history.get("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let c = chat(Arc::new(MockLlm::echo()), Arc::new(InMemoryHistory::new()));
        assert!(matches!(
            c.reply("s", "  ").await.unwrap_err(),
            ChatError::EmptyMessage
        ));
    }
}
