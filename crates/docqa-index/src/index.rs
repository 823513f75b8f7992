//! In-memory vector index with brute-force cosine similarity search.
//!
//! Populated once while the document index is built and read-only afterwards,
//! so concurrent searches need no locking. Search is O(n) in the number of
//! chunks, which is fine for a corpus of local Markdown files.

use std::cmp::Ordering;

use docqa_core::error::DocqaError;
use docqa_core::types::DocumentChunk;
use serde::{Deserialize, Serialize};

/// A chunk returned from a search, with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

/// A chunk together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: Vec::new(),
        }
    }

    /// Add a chunk. The embedding must match the index dimensionality.
    pub fn insert(&mut self, chunk: DocumentChunk, embedding: Vec<f32>) -> Result<(), DocqaError> {
        if embedding.len() != self.dimensions {
            return Err(DocqaError::IndexBuild(format!(
                "Embedding for chunk {} of '{}' has {} dimensions, index expects {}",
                chunk.order_within_source,
                chunk.source_id,
                embedding.len(),
                self.dimensions
            )));
        }
        self.entries.push(IndexEntry { chunk, embedding });
        Ok(())
    }

    /// The `k` most similar chunks, by descending score.
    ///
    /// Equal scores are ordered by `(source_id, order_within_source)` so the
    /// result is fully deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(f64, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.source_id.cmp(&b.chunk.source_id))
                .then_with(|| {
                    a.chunk
                        .order_within_source
                        .cmp(&b.chunk.order_within_source)
                })
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(score, entry)| ScoredChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, order: usize) -> DocumentChunk {
        DocumentChunk::new(source, format!("{} #{}", source, order), order)
    }

    fn unit(dims: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dims];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_insert_and_search() {
        let mut index = VectorIndex::new(4);
        index.insert(chunk("a.md", 0), unit(4, 0)).unwrap();
        index.insert(chunk("b.md", 0), unit(4, 1)).unwrap();
        assert_eq!(index.len(), 2);

        let hits = index.search(&unit(4, 1), 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source_id, "b.md");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[1].score.abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = VectorIndex::new(4);
        let err = index.insert(chunk("a.md", 0), vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, DocqaError::IndexBuild(_)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_empty_index() {
        let index = VectorIndex::new(8);
        assert!(index.search(&unit(8, 0), 10).is_empty());
    }

    #[test]
    fn test_search_k_zero() {
        let mut index = VectorIndex::new(2);
        index.insert(chunk("a.md", 0), vec![1.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 0).is_empty());
    }

    #[test]
    fn test_search_respects_k_limit() {
        let mut index = VectorIndex::new(4);
        for i in 0..10 {
            index.insert(chunk("a.md", i), vec![1.0; 4]).unwrap();
        }
        assert_eq!(index.search(&[1.0; 4], 3).len(), 3);
    }

    #[test]
    fn test_ties_broken_by_source_then_order() {
        let mut index = VectorIndex::new(2);
        index.insert(chunk("b.md", 1), vec![1.0, 0.0]).unwrap();
        index.insert(chunk("b.md", 0), vec![1.0, 0.0]).unwrap();
        index.insert(chunk("a.md", 3), vec![1.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3);
        let keys: Vec<_> = hits
            .iter()
            .map(|h| (h.chunk.source_id.as_str(), h.chunk.order_within_source))
            .collect();
        assert_eq!(keys, vec![("a.md", 3), ("b.md", 0), ("b.md", 1)]);
    }

    #[test]
    fn test_search_ordering() {
        let mut index = VectorIndex::new(3);
        index.insert(chunk("far.md", 0), vec![-1.0; 3]).unwrap();
        index.insert(chunk("close.md", 0), vec![1.0; 3]).unwrap();

        let hits = index.search(&[1.0; 3], 10);
        assert_eq!(hits[0].chunk.source_id, "close.md");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0f32; 100];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&unit(10, 0), &unit(10, 1)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0f32; 100];
        let b = vec![1.0f32; 100];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0; 10], &[1.0; 20]), 0.0);
    }
}
