use async_trait::async_trait;
use docqa_core::error::DocqaError;

use crate::index::ScoredChunk;

/// Nearest-passage lookup used by the conversation workflow.
///
/// Returns at most `k` chunks ordered by descending relevance. An empty
/// result is valid and means nothing in the corpus resembles the query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, DocqaError>;
}
