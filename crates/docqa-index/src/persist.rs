//! On-disk snapshot of a built index.
//!
//! The snapshot is keyed by a fingerprint of everything that determines the
//! index contents: the documents, the chunking parameters and the embedding
//! model. A snapshot whose fingerprint differs from the current corpus is
//! stale and must not be reused.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docqa_core::error::DocqaError;
use docqa_core::types::SourceDocument;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::index::IndexEntry;

pub const SNAPSHOT_FILE: &str = "index.json";
const SNAPSHOT_FORMAT: u32 = 1;

/// SHA-256 over the sorted documents plus chunking and model parameters.
pub fn corpus_fingerprint(
    documents: &[SourceDocument],
    chunk_size: usize,
    chunk_overlap: usize,
    embedding_model: &str,
) -> String {
    let mut sorted: Vec<&SourceDocument> = documents.iter().collect();
    sorted.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    let mut hasher = Sha256::new();
    hasher.update(SNAPSHOT_FORMAT.to_le_bytes());
    hasher.update((chunk_size as u64).to_le_bytes());
    hasher.update((chunk_overlap as u64).to_le_bytes());
    hasher.update(embedding_model.as_bytes());
    hasher.update([0u8]);
    for doc in sorted {
        hasher.update((doc.source_id.len() as u64).to_le_bytes());
        hasher.update(doc.source_id.as_bytes());
        hasher.update((doc.text.len() as u64).to_le_bytes());
        hasher.update(doc.text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub fn snapshot_path(persist_dir: &Path) -> PathBuf {
    persist_dir.join(SNAPSHOT_FILE)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub format: u32,
    pub fingerprint: String,
    pub model_name: String,
    pub dimensions: usize,
    pub source_count: usize,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
}

impl IndexSnapshot {
    pub fn new(
        fingerprint: String,
        model_name: String,
        dimensions: usize,
        source_count: usize,
        entries: Vec<IndexEntry>,
    ) -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            fingerprint,
            model_name,
            dimensions,
            source_count,
            created_at: Utc::now(),
            entries,
        }
    }

    pub fn load(path: &Path) -> Result<Self, DocqaError> {
        let contents = std::fs::read_to_string(path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&contents)?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(DocqaError::Serialization(format!(
                "Unsupported snapshot format {}",
                snapshot.format
            )));
        }
        Ok(snapshot)
    }

    /// Write through a temporary file so a crash never leaves a torn snapshot.
    pub fn save(&self, path: &Path) -> Result<(), DocqaError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string(self)?;
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), entries = self.entries.len(), "Wrote index snapshot");
        Ok(())
    }

    /// Whether this snapshot was built from exactly this corpus and model.
    pub fn matches(&self, fingerprint: &str, dimensions: usize) -> bool {
        self.fingerprint == fingerprint
            && self.dimensions == dimensions
            && self.entries.iter().all(|e| e.embedding.len() == dimensions)
    }
}
