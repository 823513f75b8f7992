//! docqa index crate - document loading, chunking, embeddings, and retrieval.
//!
//! Loads the Markdown corpus, splits it into overlapping windows, embeds each
//! chunk, and serves nearest-passage lookups from an in-memory cosine index
//! that is read-only once built. A JSON snapshot lets a restart skip
//! re-embedding when the corpus has not changed.

pub mod chunking;
pub mod document_index;
pub mod embedding;
pub mod index;
pub mod loader;
pub mod persist;
pub mod retriever;
pub mod text;

pub use chunking::TextSplitter;
pub use document_index::{BuildOrigin, DocumentIndex};
pub use embedding::{DynEmbeddingService, EmbeddingService, HashedTokenEmbedding, OnnxEmbeddingService};
pub use index::{ScoredChunk, VectorIndex};
pub use loader::load_documents;
pub use persist::{corpus_fingerprint, IndexSnapshot};
pub use retriever::Retriever;
