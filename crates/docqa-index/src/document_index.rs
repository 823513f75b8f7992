//! The searchable corpus: chunks, their embeddings, and the embedder used to
//! place queries in the same space.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use docqa_core::error::DocqaError;
use docqa_core::types::SourceDocument;
use tracing::{debug, info, warn};

use crate::chunking::TextSplitter;
use crate::embedding::DynEmbeddingService;
use crate::index::{ScoredChunk, VectorIndex};
use crate::persist::{corpus_fingerprint, snapshot_path, IndexSnapshot};
use crate::retriever::Retriever;

/// How `load_or_build` obtained the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOrigin {
    /// Chunked and embedded from the documents.
    Built,
    /// Restored from a matching on-disk snapshot.
    Restored,
}

impl std::fmt::Display for BuildOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildOrigin::Built => f.write_str("built"),
            BuildOrigin::Restored => f.write_str("restored"),
        }
    }
}

/// Read-only after construction; share it behind an `Arc`.
pub struct DocumentIndex {
    index: VectorIndex,
    embedder: Arc<dyn DynEmbeddingService>,
    fingerprint: String,
    source_count: usize,
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("chunks", &self.index.len())
            .field("sources", &self.source_count)
            .field("model", &self.embedder.model_name())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl DocumentIndex {
    /// Chunk and embed every document.
    ///
    /// Fails with `IndexBuild` when no non-empty chunk results or when any
    /// chunk cannot be embedded.
    pub async fn build(
        documents: &[SourceDocument],
        splitter: &TextSplitter,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Result<Self, DocqaError> {
        let started = Instant::now();
        if documents.is_empty() {
            return Err(DocqaError::IndexBuild("No documents to index".into()));
        }

        let chunks = splitter.split_documents(documents);
        if chunks.is_empty() {
            return Err(DocqaError::IndexBuild(
                "Documents produced no non-empty chunks".into(),
            ));
        }

        let source_count = chunks
            .iter()
            .map(|c| c.source_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        let mut index = VectorIndex::new(embedder.dimensions());
        for chunk in chunks {
            let embedding = embedder.embed_boxed(&chunk.text).await.map_err(|e| {
                DocqaError::IndexBuild(format!(
                    "Failed to embed chunk {} of '{}': {}",
                    chunk.order_within_source, chunk.source_id, e
                ))
            })?;
            index.insert(chunk, embedding)?;
        }

        let fingerprint = corpus_fingerprint(
            documents,
            splitter.chunk_size(),
            splitter.chunk_overlap(),
            embedder.model_name(),
        );

        info!(
            chunks = index.len(),
            sources = source_count,
            model = embedder.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built document index"
        );

        Ok(Self {
            index,
            embedder,
            fingerprint,
            source_count,
        })
    }

    /// Rebuild an index from a snapshot without re-embedding.
    pub fn from_snapshot(
        snapshot: IndexSnapshot,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Result<Self, DocqaError> {
        if snapshot.dimensions != embedder.dimensions() {
            return Err(DocqaError::IndexBuild(format!(
                "Snapshot has {} dimensions, embedder produces {}",
                snapshot.dimensions,
                embedder.dimensions()
            )));
        }
        if snapshot.entries.is_empty() {
            return Err(DocqaError::IndexBuild("Snapshot contains no chunks".into()));
        }

        let mut index = VectorIndex::new(snapshot.dimensions);
        for entry in snapshot.entries {
            index.insert(entry.chunk, entry.embedding)?;
        }

        Ok(Self {
            index,
            embedder,
            fingerprint: snapshot.fingerprint,
            source_count: snapshot.source_count,
        })
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot::new(
            self.fingerprint.clone(),
            self.embedder.model_name().to_string(),
            self.index.dimensions(),
            self.source_count,
            self.index.entries().to_vec(),
        )
    }

    /// Restore from `<persist_dir>/index.json` when it matches the corpus,
    /// otherwise build and rewrite the snapshot.
    ///
    /// An unreadable or stale snapshot is ignored. Failing to write the new
    /// snapshot is logged but does not fail the build.
    pub async fn load_or_build(
        documents: &[SourceDocument],
        splitter: &TextSplitter,
        embedder: Arc<dyn DynEmbeddingService>,
        persist_dir: &Path,
        reuse_persisted: bool,
    ) -> Result<(Self, BuildOrigin), DocqaError> {
        let path = snapshot_path(persist_dir);

        if reuse_persisted && path.exists() {
            let fingerprint = corpus_fingerprint(
                documents,
                splitter.chunk_size(),
                splitter.chunk_overlap(),
                embedder.model_name(),
            );
            match IndexSnapshot::load(&path) {
                Ok(snapshot) if snapshot.matches(&fingerprint, embedder.dimensions()) => {
                    match Self::from_snapshot(snapshot, Arc::clone(&embedder)) {
                        Ok(index) => {
                            info!(
                                path = %path.display(),
                                chunks = index.len(),
                                "Restored document index from snapshot"
                            );
                            return Ok((index, BuildOrigin::Restored));
                        }
                        Err(e) => warn!(error = %e, "Ignoring unusable index snapshot"),
                    }
                }
                Ok(_) => {
                    info!(path = %path.display(), "Index snapshot is stale; rebuilding")
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable index snapshot")
                }
            }
        }

        let index = Self::build(documents, splitter, embedder).await?;
        if let Err(e) = index.snapshot().save(&path) {
            warn!(path = %path.display(), error = %e, "Failed to persist index snapshot");
        }
        Ok((index, BuildOrigin::Built))
    }

    /// The `k` chunks nearest to `text`. `k == 0` returns nothing.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, DocqaError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self
            .embedder
            .embed_boxed(text)
            .await
            .map_err(|e| DocqaError::Retrieval(format!("Failed to embed query: {}", e)))?;
        let hits = self.index.search(&vector, k);
        debug!(k, hits = hits.len(), "Queried document index");
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn source_count(&self) -> usize {
        self.source_count
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }
}

#[async_trait]
impl Retriever for DocumentIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, DocqaError> {
        self.query(query, k).await
    }
}
