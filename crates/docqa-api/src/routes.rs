//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use docqa_core::error::DocqaError;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::state::AppState;

/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Browser access is limited to pages served from this host.
    let port = state.config.api.port;
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ui", get(handlers::ui))
        .route("/chat", post(handlers::chat))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{id}", axum::routing::delete(handlers::delete_session))
        .route("/sessions/{id}/messages", get(handlers::session_messages))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind the configured address and serve until the process exits.
pub async fn start_server(state: AppState) -> Result<(), DocqaError> {
    let addr = format!("{}:{}", state.config.api.host, state.config.api.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        DocqaError::Config(format!(
            "Failed to bind {}: {}. Is another instance running? Try --port or DOCQA_PORT.",
            addr, e
        ))
    })?;
    info!(%addr, "API server listening; chat page at http://{}/ui", addr);

    axum::serve(listener, router).await?;
    Ok(())
}
