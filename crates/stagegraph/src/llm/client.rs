//! Generation service interface.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};

use super::error::LlmError;
use super::types::{ChatMessage, StreamDelta};

/// Lazy, finite sequence of text increments. Not restartable.
pub type TextStream<'a> = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send + 'a>>;

/// Lazy sequence of reasoning and answer increments.
pub type DeltaStream<'a> =
    Pin<Box<dyn Stream<Item = Result<StreamDelta, LlmError>> + Send + 'a>>;

/// Generation service: role-tagged messages and a temperature in, text out.
///
/// Implementations wrap a hosted model, a local one, or a script (`MockLlm`).
///
/// **Interaction**: Held as `Arc<dyn LlmClient>` by generating stages,
/// `ReviewStage` and `HistoryChat`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Full completion for `messages`.
    async fn generate(&self, messages: &[ChatMessage], temperature: f32)
        -> Result<String, LlmError>;

    /// Streams the completion as increments. The default yields the whole
    /// `generate` result as a single increment.
    fn stream_generate(&self, messages: Vec<ChatMessage>, temperature: f32) -> TextStream<'_> {
        Box::pin(stream::once(async move {
            self.generate(&messages, temperature).await
        }))
    }

    /// Streams reasoning and answer increments. The default carries only
    /// `stream_generate` text.
    fn stream_deltas(&self, messages: Vec<ChatMessage>, temperature: f32) -> DeltaStream<'_> {
        Box::pin(
            self.stream_generate(messages, temperature)
                .map(|item| item.map(StreamDelta::Text)),
        )
    }
}
