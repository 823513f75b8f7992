//! Grounded answering over retrieved passages.
//!
//! Policy, in order: answer from the passages when they cover the question;
//! otherwise answer from general knowledge if confident; otherwise ask a
//! clarifying question. Answers are at most `max_sentences` long.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use docqa_core::types::Message;
use docqa_index::text::content_words;
use docqa_index::ScoredChunk;
use docqa_llm::{build_conversation, ChatModel};
use tracing::debug;

use crate::error::ChatError;
use crate::prompts::qa_system_prompt;

pub const DEFAULT_MAX_SENTENCES: usize = 3;

#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(
        &self,
        query: &str,
        passages: &[ScoredChunk],
        history: &[Message],
    ) -> Result<String, ChatError>;
}

/// Split text into sentences ending in `.`, `!` or `?` followed by
/// whitespace or the end of the text. Trailing text without a terminator
/// counts as a final sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Keep at most the first `n` sentences of `text`.
pub fn limit_sentences(text: &str, n: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.len() <= n {
        return text.trim().to_string();
    }
    sentences[..n].join(" ")
}

// =============================================================================
// LLM-backed
// =============================================================================

pub struct LlmAnswerer {
    model: Arc<dyn ChatModel>,
    max_sentences: usize,
}

impl LlmAnswerer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_sentences: DEFAULT_MAX_SENTENCES,
        }
    }

    pub fn with_max_sentences(mut self, max_sentences: usize) -> Self {
        self.max_sentences = max_sentences.max(1);
        self
    }
}

#[async_trait]
impl Answerer for LlmAnswerer {
    async fn answer(
        &self,
        query: &str,
        passages: &[ScoredChunk],
        history: &[Message],
    ) -> Result<String, ChatError> {
        let texts: Vec<&str> = passages.iter().map(|p| p.chunk.text.as_str()).collect();
        let system = qa_system_prompt(&texts, self.max_sentences);
        let messages = build_conversation(system, history, query);

        let reply = self
            .model
            .complete(&messages)
            .await
            .map_err(|e| ChatError::Answer(e.to_string()))?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(ChatError::Answer("model returned an empty answer".into()));
        }
        Ok(limit_sentences(reply, self.max_sentences))
    }
}

// =============================================================================
// Extractive
// =============================================================================

const CLARIFYING_QUESTION: &str = "I couldn't find this in the documents and don't want to guess. \
Could you rephrase your question or add more detail about what you are looking for?";

/// Answers by quoting the passage sentences that best overlap the query.
///
/// A passage is relevant when it contains at least `min_coverage` of the
/// query's content words. Nothing outside the passages is ever stated; when
/// no passage is relevant the reply is a clarifying question.
#[derive(Debug, Clone)]
pub struct ExtractiveAnswerer {
    max_sentences: usize,
    min_coverage: f64,
}

impl Default for ExtractiveAnswerer {
    fn default() -> Self {
        Self {
            max_sentences: DEFAULT_MAX_SENTENCES,
            min_coverage: 0.5,
        }
    }
}

impl ExtractiveAnswerer {
    pub fn new(max_sentences: usize, min_coverage: f64) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
            min_coverage: min_coverage.clamp(0.0, 1.0),
        }
    }

    pub fn clarifying_question() -> &'static str {
        CLARIFYING_QUESTION
    }

    fn compose(&self, query: &str, passages: &[ScoredChunk]) -> Option<String> {
        let query_words: HashSet<String> = content_words(query).into_iter().collect();
        if query_words.is_empty() {
            return None;
        }
        let coverage = |text: &str| -> f64 {
            let words: HashSet<String> = content_words(text).into_iter().collect();
            query_words.intersection(&words).count() as f64 / query_words.len() as f64
        };

        let (best, best_coverage) = passages
            .iter()
            .map(|p| (p, coverage(&p.chunk.text)))
            .fold(None, |acc: Option<(&ScoredChunk, f64)>, (p, c)| match acc {
                Some((_, best)) if best >= c => acc,
                _ => Some((p, c)),
            })?;
        debug!(
            source = %best.chunk.source_id,
            coverage = best_coverage,
            "Best extractive passage"
        );
        if best_coverage < self.min_coverage {
            return None;
        }

        let sentences = split_sentences(&best.chunk.text);
        let mut ranked: Vec<(usize, f64)> = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| (i, coverage(s)))
            .filter(|(_, c)| *c > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.max_sentences);
        // Quote in document order.
        ranked.sort_by_key(|(i, _)| *i);

        let answer = ranked
            .iter()
            .map(|(i, _)| sentences[*i])
            .collect::<Vec<_>>()
            .join(" ");
        (!answer.is_empty()).then_some(answer)
    }
}

#[async_trait]
impl Answerer for ExtractiveAnswerer {
    async fn answer(
        &self,
        query: &str,
        passages: &[ScoredChunk],
        _history: &[Message],
    ) -> Result<String, ChatError> {
        Ok(self
            .compose(query, passages)
            .unwrap_or_else(|| CLARIFYING_QUESTION.to_string()))
    }
}
