//! Session history: per-session ordered conversation turns.
//!
//! The store is an explicit collaborator handed to whatever needs it
//! (`HistoryChat`, support stages), never ambient state.

mod history;
mod in_memory;

pub use history::{HistoryError, SessionHistory};
pub use in_memory::InMemoryHistory;
