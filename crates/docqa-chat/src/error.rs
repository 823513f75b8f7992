//! Error types for the conversation workflow.

use std::time::Duration;

use docqa_core::error::DocqaError;

use crate::types::WorkflowState;

/// Errors from the chat engine.
///
/// Every error leaves the session exactly as it was before the submission.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("rewrite failed: {0}")]
    Rewrite(String),
    #[error("retrieval failed: {0}")]
    Retrieval(String),
    #[error("answer failed: {0}")]
    Answer(String),
    #[error("timed out after {elapsed:?} while {stage}")]
    Timeout {
        elapsed: Duration,
        stage: WorkflowState,
    },
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("session is busy: {0}")]
    SessionBusy(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// The workflow stage that failed, or `None` for errors raised outside
    /// the workflow (validation, session lookup).
    pub fn stage(&self) -> Option<WorkflowState> {
        match self {
            ChatError::Rewrite(_) => Some(WorkflowState::Rewriting),
            ChatError::Retrieval(_) => Some(WorkflowState::Retrieving),
            ChatError::Answer(_) => Some(WorkflowState::Answering),
            ChatError::Timeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether the caller sent bad input, as opposed to a failure downstream.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::MessageTooLong(_))
    }
}

impl From<DocqaError> for ChatError {
    fn from(err: DocqaError) -> Self {
        match err {
            DocqaError::Retrieval(msg) | DocqaError::Embedding(msg) => ChatError::Retrieval(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
