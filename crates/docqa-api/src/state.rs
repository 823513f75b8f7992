//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use docqa_chat::ConversationOrchestrator;
use docqa_core::config::DocqaConfig;
use docqa_index::DocumentIndex;

/// Shared application state, cloned into every handler via axum's `State`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed after start-up.
    pub config: Arc<DocqaConfig>,
    /// Runs the rewrite/retrieve/answer workflow and owns the session store.
    pub orchestrator: Arc<ConversationOrchestrator>,
    /// The document index, kept for health reporting.
    pub index: Arc<DocumentIndex>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: DocqaConfig,
        orchestrator: Arc<ConversationOrchestrator>,
        index: Arc<DocumentIndex>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            index,
            start_time: Instant::now(),
        }
    }

    /// Session id used when a request does not name one.
    pub fn default_session_id(&self) -> &str {
        &self.config.session.default_session_id
    }
}
