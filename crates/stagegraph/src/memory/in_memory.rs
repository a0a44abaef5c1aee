//! In-memory session history. Not persistent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::llm::ChatMessage;

use super::history::{HistoryError, SessionHistory};

fn check_id(session_id: &str) -> Result<(), HistoryError> {
    if session_id.trim().is_empty() {
        return Err(HistoryError::InvalidSession(session_id.to_string()));
    }
    Ok(())
}

/// History held in a shared map. Clones share the same sessions.
///
/// With `with_capacity(n)` only the newest `n` turns of each session are kept.
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    inner: Arc<RwLock<HashMap<String, Vec<ChatMessage>>>>,
    capacity: Option<usize>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `max_turns` turns per session.
    pub fn with_capacity(max_turns: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity: Some(max_turns),
        }
    }
}

#[async_trait]
impl SessionHistory for InMemoryHistory {
    async fn get(&self, session_id: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        check_id(session_id)?;
        Ok(self
            .inner
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, turns: &[ChatMessage]) -> Result<(), HistoryError> {
        check_id(session_id)?;
        let mut guard = self.inner.write().await;
        let session = guard.entry(session_id.to_string()).or_default();
        session.extend_from_slice(turns);
        if let Some(cap) = self.capacity {
            let excess = session.len().saturating_sub(cap);
            session.drain(..excess);
        }
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), HistoryError> {
        check_id(session_id)?;
        self.inner.write().await.remove(session_id);
        Ok(())
    }
}
