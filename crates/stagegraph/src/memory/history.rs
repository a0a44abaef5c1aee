//! SessionHistory trait and HistoryError.

use async_trait::async_trait;

use crate::llm::ChatMessage;

/// Error for history operations.
///
/// Backend errors are flattened to strings so callers do not depend on them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HistoryError {
    /// Session ids must be non-empty.
    #[error("invalid session id: {0:?}")]
    InvalidSession(String),

    /// Backend storage failed.
    #[error("storage: {0}")]
    Storage(String),
}

/// Ordered turns keyed by an opaque session id.
///
/// A session is created lazily on first append. Turns of one session are never
/// visible through another session id. Retention is up to the implementation.
///
/// **Interaction**: Held as `Arc<dyn SessionHistory>` by `HistoryChat` and by
/// stages that answer in a conversation.
#[async_trait]
pub trait SessionHistory: Send + Sync {
    /// Turns of `session_id`, oldest first; empty for an unknown session.
    async fn get(&self, session_id: &str) -> Result<Vec<ChatMessage>, HistoryError>;

    /// Appends `turns` in order.
    async fn append(&self, session_id: &str, turns: &[ChatMessage]) -> Result<(), HistoryError>;

    /// Drops every turn of `session_id`.
    async fn clear(&self, session_id: &str) -> Result<(), HistoryError>;
}
