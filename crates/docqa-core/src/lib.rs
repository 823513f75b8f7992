//! Shared types, configuration, and errors for the docqa workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::DocqaConfig;
pub use error::{DocqaError, Result};
pub use types::*;
