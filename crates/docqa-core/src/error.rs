use thiserror::Error;

/// Top-level error type for docqa.
///
/// Start-up failures (`Config`, `IndexBuild`) are fatal and reported before any
/// question is accepted. The remaining variants surface from individual
/// operations; crates with their own error enums implement
/// `From<DocqaError>` so `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocqaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index build error: {0}")]
    IndexBuild(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for DocqaError {
    fn from(err: toml::de::Error) -> Self {
        DocqaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DocqaError {
    fn from(err: toml::ser::Error) -> Self {
        DocqaError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DocqaError {
    fn from(err: serde_json::Error) -> Self {
        DocqaError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for docqa operations.
pub type Result<T> = std::result::Result<T, DocqaError>;
