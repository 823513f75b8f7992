use std::path::Path;

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DocqaError, Result};

/// Embedding backends accepted by `retrieval.embedding_backend`.
pub const EMBEDDING_BACKENDS: &[&str] = &["onnx", "hashed"];

/// Top-level configuration for docqa.
///
/// Loaded from `~/.docqa/config.toml` by default. Every section falls back to
/// its defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocqaConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl DocqaConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DocqaConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject settings the rest of the system cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(DocqaError::Config(
                "chunking.chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(DocqaError::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(DocqaError::Config(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }
        if !EMBEDDING_BACKENDS.contains(&self.retrieval.embedding_backend.as_str()) {
            return Err(DocqaError::Config(format!(
                "unknown retrieval.embedding_backend '{}' (expected one of {:?})",
                self.retrieval.embedding_backend, EMBEDDING_BACKENDS
            )));
        }
        if self.retrieval.hashed_dimensions == 0 {
            return Err(DocqaError::Config(
                "retrieval.hashed_dimensions must be greater than 0".to_string(),
            ));
        }
        if self.session.max_answer_sentences == 0 {
            return Err(DocqaError::Config(
                "session.max_answer_sentences must be greater than 0".to_string(),
            ));
        }
        if self.documents.extension.trim().is_empty() {
            return Err(DocqaError::Config(
                "documents.extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Base directory for a relative `retrieval.persist_dir`.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.docqa".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Where the question-answering corpus lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Directory scanned (non-recursively) at start-up.
    pub dir: String,
    /// File extension of eligible documents, without the dot.
    pub extension: String,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: "docs".to_string(),
            extension: "md".to_string(),
        }
    }
}

/// Chunk window settings, measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Embedding and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of passages handed to the answerer.
    pub top_k: usize,
    /// "onnx" (sentence-transformer) or "hashed" (deterministic token hashing).
    pub embedding_backend: String,
    /// Embedding model name, recorded in the index fingerprint.
    pub embedding_model: String,
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
    /// Vector width for the hashed backend.
    pub hashed_dimensions: usize,
    /// Directory for the persisted index snapshot.
    pub persist_dir: String,
    /// Reuse the snapshot when it matches the current corpus.
    pub reuse_persisted: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            embedding_backend: "onnx".to_string(),
            embedding_model: "sentence-transformers/all-mpnet-base-v2".to_string(),
            model_dir: "models/all-mpnet-base-v2".to_string(),
            hashed_dimensions: 384,
            persist_dir: "index_persist".to_string(),
            reuse_persisted: true,
        }
    }
}

/// Hosted chat-completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API base, up to and including the version segment.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Inline API key. The environment variable wins when both are set.
    /// Redacted in debug output and never written back by `save`.
    #[serde(skip_serializing)]
    pub api_key: Option<Secret<String>>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Retries for transient failures (timeouts, 429, 5xx).
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "gemma2-9b-it".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            api_key: None,
            temperature: 0.0,
            max_tokens: 512,
            timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the environment or the config file.
    ///
    /// A missing or blank credential is a configuration error: no request may
    /// be sent without one.
    pub fn resolve_api_key(&self) -> Result<String> {
        let from_env = std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        let from_file = self
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().clone())
            .filter(|k| !k.trim().is_empty());

        from_env.or(from_file).ok_or_else(|| {
            DocqaError::Config(format!(
                "Please provide your API key: set the {} environment variable or llm.api_key in the config file.",
                self.api_key_env
            ))
        })
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session used when a request does not name one.
    pub default_session_id: String,
    pub max_message_chars: usize,
    pub max_answer_sentences: usize,
    /// Upper bound on one question's rewrite + retrieve + answer round.
    pub invocation_timeout_secs: u64,
    /// Idle sessions older than this are evicted. 0 keeps them forever.
    pub idle_timeout_minutes: u64,
    /// Maximum live sessions. 0 is unbounded.
    pub max_sessions: usize,
    /// How often the eviction sweep runs.
    pub eviction_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_session_id: "default_session".to_string(),
            max_message_chars: 4000,
            max_answer_sentences: 3,
            invocation_timeout_secs: 120,
            idle_timeout_minutes: 0,
            max_sessions: 0,
            eviction_interval_secs: 60,
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
        }
    }
}
