//! docqa API crate - axum HTTP server and route handlers.
//!
//! Exposes the conversation workflow over JSON: submitting questions,
//! reading and deleting session transcripts, health, and the chat page.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
