//! Generation call errors.

use thiserror::Error;

/// Errors from a generation call.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Service unreachable or not configured.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// API returned an error (4xx/5xx or business error).
    #[error("api error: {0}")]
    ApiError(String),

    /// Rate limited (e.g. 429).
    #[error("rate limit: {0}")]
    RateLimit(String),

    /// Authentication failed (e.g. 401/403).
    #[error("auth failed: {0}")]
    Auth(String),

    /// Request rejected as invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or connection error.
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be parsed.
    #[error("parsing failed: {0}")]
    Parsing(String),

    /// Stream ended with an error.
    #[error("stream closed: {0}")]
    StreamClosed(String),
}
