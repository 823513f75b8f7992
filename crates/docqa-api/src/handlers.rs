//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path parameters or a JSON body via axum extractors,
//! calls into the orchestrator, and returns JSON responses.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use docqa_chat::{ChatReply, SessionSummary, SourceRef};
use docqa_core::types::Message;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

/// Request body for POST /chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Target session; the configured default session when absent or blank.
    pub session_id: Option<String>,
}

/// Response for POST /chat.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub answer: String,
    pub rewritten_query: String,
    pub sources: Vec<SourceRef>,
    pub messages: Vec<Message>,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            session_id: reply.session_id,
            answer: reply.answer,
            rewritten_query: reply.rewritten_query,
            sources: reply.sources,
            messages: vec![reply.user_message, reply.assistant_message],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub chunk_count: u64,
    pub source_count: u64,
    pub session_count: u64,
    pub embedding_model: String,
}

// =============================================================================
// Handler functions
// =============================================================================

/// POST /chat - submit one question to a session.
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = body?;

    let session_id = req
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.default_session_id())
        .to_string();

    match state.orchestrator.submit(&session_id, &req.message).await {
        Ok(reply) => Ok(Json(ChatResponse::from(reply))),
        Err(e) => {
            if !e.is_invalid_input() {
                warn!(session = %session_id, error = %e, "Chat invocation failed");
            }
            Err(e.into())
        }
    }
}

/// GET /sessions - summaries of all live sessions, most recent first.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionsResponse>, ApiError> {
    let sessions = state.orchestrator.sessions()?;
    Ok(Json(SessionsResponse { sessions }))
}

/// GET /sessions/{id}/messages - the ordered transcript of one session.
pub async fn session_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.orchestrator.transcript(&id).await?;
    Ok(Json(messages))
}

/// DELETE /sessions/{id} - discard a session and its history.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_session(&id)?;
    info!(session = %id, "Session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        chunk_count: state.index.len() as u64,
        source_count: state.index.source_count() as u64,
        session_count: state.orchestrator.store().len() as u64,
        embedding_model: state.index.model_name().to_string(),
    })
}

/// GET /ui - serve the self-contained chat page.
pub async fn ui() -> impl IntoResponse {
    Html(docqa_ui::CHAT_HTML)
}
