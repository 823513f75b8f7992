//! Overlapping fixed-size text windows.
//!
//! Sizes are measured in Unicode scalar values. Each window is cut at the
//! latest natural break it contains (paragraph, line, sentence, whitespace)
//! as long as the window stays longer than the overlap; otherwise it is cut
//! hard. The next window always starts exactly `chunk_overlap` characters
//! before the previous one ended.

use docqa_core::config::ChunkingConfig;
use docqa_core::error::DocqaError;
use docqa_core::types::{DocumentChunk, SourceDocument};
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, DocqaError> {
        if chunk_size == 0 {
            return Err(DocqaError::Config("chunk_size must be > 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(DocqaError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, DocqaError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into windows. Whitespace-only windows are dropped.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        let mut windows = Vec::new();
        if len <= self.chunk_size {
            windows.push((0, len));
        } else {
            let mut start = 0;
            loop {
                let hard_end = start + self.chunk_size;
                if hard_end >= len {
                    windows.push((start, len));
                    break;
                }
                let end = self.find_break(&chars, start, hard_end);
                windows.push((start, end));
                start = end - self.chunk_overlap;
            }
        }

        windows
            .into_iter()
            .map(|(s, e)| chars[s..e].iter().collect::<String>())
            .filter(|w| !w.trim().is_empty())
            .collect()
    }

    /// Split one document into chunks numbered from 0.
    pub fn split_document(&self, document: &SourceDocument) -> Vec<DocumentChunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(order, text)| DocumentChunk::new(&document.source_id, text, order))
            .collect()
    }

    pub fn split_documents(&self, documents: &[SourceDocument]) -> Vec<DocumentChunk> {
        let chunks: Vec<DocumentChunk> = documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect();
        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            "Split documents into chunks"
        );
        chunks
    }

    /// Latest break position in `(start + overlap, hard_end]`, by preference
    /// order, or `hard_end` when none exists.
    fn find_break(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let min_end = start + self.chunk_overlap + 1;
        let candidates = || (min_end..=hard_end).rev();

        let paragraph = candidates().find(|&e| e >= 2 && chars[e - 2] == '\n' && chars[e - 1] == '\n');
        if let Some(e) = paragraph {
            return e;
        }
        let line = candidates().find(|&e| chars[e - 1] == '\n');
        if let Some(e) = line {
            return e;
        }
        let sentence = candidates().find(|&e| {
            matches!(chars[e - 1], '.' | '!' | '?') && chars.get(e).is_some_and(|c| c.is_whitespace())
        });
        if let Some(e) = sentence {
            return e;
        }
        candidates()
            .find(|&e| chars[e - 1].is_whitespace())
            .unwrap_or(hard_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorem(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{}", i % 97))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn assert_exact_overlap(chunks: &[String], overlap: usize) {
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            let tail: String = prev[prev.len() - overlap..].iter().collect();
            let head: String = next[..overlap].iter().collect();
            assert_eq!(tail, head);
        }
    }

    // ---- Construction ----

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(matches!(
            TextSplitter::new(100, 100),
            Err(DocqaError::Config(_))
        ));
        assert!(TextSplitter::new(100, 150).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(100, 0).is_ok());
    }

    #[test]
    fn test_default_is_1000_200() {
        let s = TextSplitter::default();
        assert_eq!(s.chunk_size(), 1000);
        assert_eq!(s.chunk_overlap(), 200);
    }

    // ---- Splitting ----

    #[test]
    fn test_short_text_is_single_chunk() {
        let s = TextSplitter::default();
        let chunks = s.split_text("A short document.");
        assert_eq!(chunks, vec!["A short document.".to_string()]);
    }

    #[test]
    fn test_whitespace_only_text_yields_nothing() {
        let s = TextSplitter::default();
        assert!(s.split_text("").is_empty());
        assert!(s.split_text("   \n\n\t ").is_empty());
    }

    #[test]
    fn test_adjacent_chunks_overlap_exactly() {
        let s = TextSplitter::default();
        let text = lorem(1200);
        let chunks = s.split_text(&text);
        assert!(chunks.len() > 2);
        for c in &chunks {
            assert!(c.chars().count() <= 1000);
        }
        assert_exact_overlap(&chunks, 200);
    }

    #[test]
    fn test_overlap_holds_without_any_break() {
        let s = TextSplitter::new(50, 10).unwrap();
        let text = "x".repeat(175);
        let chunks = s.split_text(&text);
        // 0..50, 40..90, 80..130, 120..170, 160..175
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0].len(), 50);
        assert_exact_overlap(&chunks, 10);
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let s = TextSplitter::new(40, 5).unwrap();
        let text = format!("{}\n\n{}", "a".repeat(20), "b b b b b b b b b b b b b b b");
        let chunks = s.split_text(&text);
        assert!(chunks[0].ends_with("\n\n"));
        assert_exact_overlap(&chunks, 5);
    }

    #[test]
    fn test_prefers_sentence_over_plain_space() {
        let s = TextSplitter::new(30, 4).unwrap();
        let text = "First sentence here. Then more words follow after it";
        let chunks = s.split_text(text);
        assert_eq!(chunks[0], "First sentence here.");
        assert_exact_overlap(&chunks, 4);
    }

    #[test]
    fn test_concatenation_reconstructs_text() {
        let s = TextSplitter::new(120, 30).unwrap();
        let text = lorem(300);
        let chunks = s.split_text(&text);
        let mut rebuilt: String = chunks[0].clone();
        for c in &chunks[1..] {
            rebuilt.extend(c.chars().skip(30));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_multibyte_characters_counted_as_units() {
        let s = TextSplitter::new(10, 2).unwrap();
        let text = "é".repeat(25);
        let chunks = s.split_text(&text);
        assert_eq!(chunks[0].chars().count(), 10);
        assert_exact_overlap(&chunks, 2);
    }

    // ---- Documents ----

    #[test]
    fn test_split_documents_numbers_per_source() {
        let s = TextSplitter::new(50, 10).unwrap();
        let docs = vec![
            SourceDocument::new("a.md", lorem(40)),
            SourceDocument::new("b.md", "tiny"),
            SourceDocument::new("c.md", "   "),
        ];
        let chunks = s.split_documents(&docs);

        let a: Vec<_> = chunks.iter().filter(|c| c.source_id == "a.md").collect();
        assert!(a.len() > 1);
        for (i, c) in a.iter().enumerate() {
            assert_eq!(c.order_within_source, i);
        }
        let b: Vec<_> = chunks.iter().filter(|c| c.source_id == "b.md").collect();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].order_within_source, 0);
        assert!(chunks.iter().all(|c| c.source_id != "c.md"));
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
    }
}
