//! Generation service client and message types.
//!
//! - `LlmClient`: `generate(messages, temperature)` plus a streaming variant
//! - `ChatMessage` / `MessageRole`: role-tagged prompt messages
//! - `LlmError`: call failures
//! - `MockLlm`: scripted client for tests and offline runs
//! - `OpenAiClient`: Chat Completions client (feature `openai`)

mod client;
mod error;
mod mock;
#[cfg(feature = "openai")]
mod openai;
mod types;

pub use client::{DeltaStream, LlmClient, TextStream};
pub use error::LlmError;
pub use mock::{MockLlm, RecordedRequest};
#[cfg(feature = "openai")]
pub use openai::{OpenAiClient, OpenAiConfig};
pub use types::{ChatMessage, MessageRole, StreamDelta};
