//! docqa chat crate - sessions and the history-aware question workflow.
//!
//! A submission is rewritten into a self-contained query using the session
//! history, matched against the document index, answered from the retrieved
//! passages, and recorded in the session log as a user/assistant pair.

pub mod answerer;
pub mod error;
pub mod orchestrator;
pub mod prompts;
pub mod rewriter;
pub mod session;
pub mod types;

pub use answerer::{limit_sentences, Answerer, ExtractiveAnswerer, LlmAnswerer};
pub use error::ChatError;
pub use orchestrator::{ConversationOrchestrator, OrchestratorConfig};
pub use rewriter::{ContextualRewriter, LlmQueryRewriter, QueryRewriter};
pub use session::{ExpiryPolicy, SessionHandle, SessionStore};
pub use types::{ChatReply, SessionSummary, SourceRef, WorkflowState};
