//! Conversation orchestrator: runs one question through rewrite, retrieval
//! and answering, then records the exchange.
//!
//! Each submission holds its session's lock from reading the history to
//! appending the result, so submissions to one session never interleave.
//! The user and assistant messages are appended together after the answer
//! arrives, with no await point in between: a failure or timeout at any
//! earlier point leaves the session untouched.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use docqa_core::config::DocqaConfig;
use docqa_core::types::Message;
use docqa_index::Retriever;
use tracing::{debug, info, warn};

use crate::answerer::Answerer;
use crate::error::ChatError;
use crate::rewriter::QueryRewriter;
use crate::session::SessionStore;
use crate::types::{ChatReply, SessionSummary, SourceRef, WorkflowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub top_k: usize,
    pub max_message_chars: usize,
    pub invocation_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_message_chars: 4000,
            invocation_timeout: Duration::from_secs(120),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &DocqaConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_message_chars: config.session.max_message_chars,
            invocation_timeout: Duration::from_secs(config.session.invocation_timeout_secs),
        }
    }
}

/// Current stage of one submission, readable after a timeout.
struct StageTracker {
    session_id: String,
    started: Instant,
    state: Mutex<WorkflowState>,
}

impl StageTracker {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            started: Instant::now(),
            state: Mutex::new(WorkflowState::Idle),
        }
    }

    fn get(&self) -> WorkflowState {
        match self.state.lock() {
            Ok(s) => *s,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn advance(&self, to: WorkflowState) {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!(
            session_id = %self.session_id,
            from = %*state,
            to = %to,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Workflow transition"
        );
        *state = to;
    }
}

pub struct ConversationOrchestrator {
    store: Arc<SessionStore>,
    rewriter: Arc<dyn QueryRewriter>,
    retriever: Arc<dyn Retriever>,
    answerer: Arc<dyn Answerer>,
    config: OrchestratorConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        rewriter: Arc<dyn QueryRewriter>,
        retriever: Arc<dyn Retriever>,
        answerer: Arc<dyn Answerer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            rewriter,
            retriever,
            answerer,
            config,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Answer `input` in the context of `session_id`.
    ///
    /// On success the session has gained exactly one user message followed
    /// by one assistant message. On any error it is unchanged.
    pub async fn submit(&self, session_id: &str, input: &str) -> Result<ChatReply, ChatError> {
        let question = input.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if question.chars().count() > self.config.max_message_chars {
            return Err(ChatError::MessageTooLong(self.config.max_message_chars));
        }

        let tracker = StageTracker::new(session_id);
        let outcome =
            tokio::time::timeout(self.config.invocation_timeout, self.run(&tracker, question))
                .await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout {
                elapsed: tracker.started.elapsed(),
                stage: tracker.get(),
            }),
        };

        match &result {
            Ok(reply) => info!(
                session_id,
                sources = reply.sources.len(),
                elapsed_ms = tracker.started.elapsed().as_millis() as u64,
                "Answered question"
            ),
            Err(e) => {
                let stage = e.stage().unwrap_or_else(|| tracker.get());
                tracker.advance(WorkflowState::Failed);
                warn!(session_id, stage = %stage, error = %e, "Question failed");
            }
        }
        result
    }

    async fn run(&self, tracker: &StageTracker, question: &str) -> Result<ChatReply, ChatError> {
        let session_id = tracker.session_id.as_str();
        let handle = self.store.get_or_create(session_id)?;
        let mut guard = handle.lock().await;

        tracker.advance(WorkflowState::Rewriting);
        let history = guard.messages();
        let rewritten = self.rewriter.rewrite(history, question).await?;
        let rewritten = if rewritten.trim().is_empty() {
            warn!(session_id, "Rewriter returned nothing; using the question as asked");
            question.to_string()
        } else {
            rewritten.trim().to_string()
        };
        debug!(session_id, rewritten = %rewritten, "Rewrote question");

        tracker.advance(WorkflowState::Retrieving);
        let passages = self
            .retriever
            .retrieve(&rewritten, self.config.top_k)
            .await
            .map_err(|e| ChatError::Retrieval(e.to_string()))?;

        tracker.advance(WorkflowState::Answering);
        let answer = self.answerer.answer(&rewritten, &passages, history).await?;

        let (user_message, assistant_message) = guard.append_exchange(question, &answer);
        tracker.advance(WorkflowState::Done);

        Ok(ChatReply {
            session_id: session_id.to_string(),
            answer,
            rewritten_query: rewritten,
            sources: passages.iter().map(SourceRef::from).collect(),
            user_message,
            assistant_message,
        })
    }

    pub async fn transcript(&self, session_id: &str) -> Result<Vec<Message>, ChatError> {
        self.store.transcript(session_id).await
    }

    pub fn sessions(&self) -> Result<Vec<SessionSummary>, ChatError> {
        self.store.list()
    }

    /// Forget a session. Refused with `SessionBusy` while a submission is
    /// running or queued on it.
    pub fn delete_session(&self, session_id: &str) -> Result<(), ChatError> {
        if self.store.delete(session_id)? {
            Ok(())
        } else {
            Err(ChatError::SessionNotFound(session_id.to_string()))
        }
    }
}
