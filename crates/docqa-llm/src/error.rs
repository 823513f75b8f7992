use std::time::Duration;

use docqa_core::error::DocqaError;
use thiserror::Error;

/// Errors from a chat-completions backend.
///
/// `retryable` marks failures worth another attempt: timeouts, connection
/// errors, rate limiting and upstream 5xx responses.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retryable: bool,
        retry_after: Option<Duration>,
    },

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Decode error: {0}")]
    Decode(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport { retryable, .. } | LlmError::Http { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<LlmError> for DocqaError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingCredential(msg) => DocqaError::Config(msg),
            other => DocqaError::Llm(other.to_string()),
        }
    }
}
