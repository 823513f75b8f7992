//! Follow-up resolution: turn the latest question into one that stands on its
//! own, using only the session history.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use docqa_core::types::{Message, Role};
use docqa_llm::{build_conversation, ChatModel, LlmError};
use regex::{Captures, Regex};
use tracing::debug;

use crate::error::ChatError;
use crate::prompts::REWRITE_SYSTEM_PROMPT;

/// Rewrites a follow-up question into a self-contained query.
///
/// Implementations restate, never answer, and add nothing that is not in the
/// history. With empty history the question is returned unchanged.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, history: &[Message], question: &str) -> Result<String, ChatError>;
}

// =============================================================================
// LLM-backed
// =============================================================================

pub struct LlmQueryRewriter {
    model: Arc<dyn ChatModel>,
}

impl LlmQueryRewriter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl QueryRewriter for LlmQueryRewriter {
    async fn rewrite(&self, history: &[Message], question: &str) -> Result<String, ChatError> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let messages = build_conversation(REWRITE_SYSTEM_PROMPT.to_string(), history, question);
        match self.model.complete(&messages).await {
            Ok(reply) => Ok(reply.trim().to_string()),
            // Degenerate output; the orchestrator falls back to the question.
            Err(LlmError::EmptyResponse) => Ok(String::new()),
            Err(e) => Err(ChatError::Rewrite(e.to_string())),
        }
    }
}

// =============================================================================
// Rule-based
// =============================================================================

static SUBJECT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^\s*(?:what|who)(?:'s|\s+(?:is|are|was|were))\s+(?:an?\s+|the\s+)?(.+?)[\s?.!]*$",
        r"(?i)^\s*(?:tell me about|explain|describe|define)\s+(?:an?\s+|the\s+)?(.+?)[\s?.!]*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid subject regex"))
    .collect()
});

static PRONOUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(its|it|they|them)\b|\b(this|that)\b(\s*[?.!,]|\s*$)")
        .expect("Invalid pronoun regex")
});

/// Resolves pronouns against the subject of the most recent "what is X?"
/// style question in the history.
///
/// Deterministic and model-free. If no subject or no pronoun is found the
/// question is returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextualRewriter;

impl ContextualRewriter {
    pub fn new() -> Self {
        Self
    }

    /// The topic of the latest user question that names one.
    pub fn subject(history: &[Message]) -> Option<String> {
        history
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .find_map(|m| {
                SUBJECT_PATTERNS
                    .iter()
                    .find_map(|re| re.captures(m.content.trim()))
                    .and_then(|c| c.get(1))
                    .map(|s| s.as_str().trim().to_string())
                    .filter(|s| !s.is_empty())
            })
    }

    pub fn resolve(history: &[Message], question: &str) -> String {
        let Some(subject) = Self::subject(history) else {
            return question.to_string();
        };

        PRONOUN
            .replace_all(question, |caps: &Captures| {
                if let Some(p) = caps.get(1) {
                    if p.as_str().eq_ignore_ascii_case("its") {
                        format!("{}'s", subject)
                    } else {
                        subject.clone()
                    }
                } else {
                    let tail = caps.get(3).map(|t| t.as_str()).unwrap_or("");
                    format!("{}{}", subject, tail)
                }
            })
            .into_owned()
    }
}

#[async_trait]
impl QueryRewriter for ContextualRewriter {
    async fn rewrite(&self, history: &[Message], question: &str) -> Result<String, ChatError> {
        if history.is_empty() {
            return Ok(question.to_string());
        }
        let rewritten = Self::resolve(history, question);
        debug!(original = question, rewritten = %rewritten, "Resolved follow-up");
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_llm::ScriptedChatModel;
    use docqa_llm::PromptRole;

    fn history() -> Vec<Message> {
        vec![Message::user("What is X?"), Message::assistant("X is a protocol.")]
    }

    // ---- ContextualRewriter ----

    #[tokio::test]
    async fn test_empty_history_returns_input() {
        let r = ContextualRewriter::new();
        assert_eq!(r.rewrite(&[], "Who invented it?").await.unwrap(), "Who invented it?");
    }

    #[tokio::test]
    async fn test_resolves_pronoun_to_subject() {
        let r = ContextualRewriter::new();
        let out = r.rewrite(&history(), "Who invented it?").await.unwrap();
        assert_eq!(out, "Who invented X?");
        // Restates, does not answer.
        assert!(!out.contains("protocol"));
    }

    #[test]
    fn test_subject_extraction_variants() {
        let h = |q: &str| vec![Message::user(q)];
        assert_eq!(ContextualRewriter::subject(&h("What is the SPHERE testbed?")).as_deref(), Some("SPHERE testbed"));
        assert_eq!(ContextualRewriter::subject(&h("who's Ada Lovelace")).as_deref(), Some("Ada Lovelace"));
        assert_eq!(ContextualRewriter::subject(&h("Tell me about Merlin.")).as_deref(), Some("Merlin"));
        assert_eq!(ContextualRewriter::subject(&h("How are you?")), None);
    }

    #[test]
    fn test_uses_most_recent_subject() {
        let history = vec![
            Message::user("What is X?"),
            Message::assistant("X is a protocol."),
            Message::user("What is Y?"),
            Message::assistant("Y is a tool."),
        ];
        assert_eq!(ContextualRewriter::resolve(&history, "Who wrote it?"), "Who wrote Y?");
    }

    #[test]
    fn test_possessive_and_demonstratives() {
        assert_eq!(
            ContextualRewriter::resolve(&history(), "What is its license?"),
            "What is X's license?"
        );
        assert_eq!(
            ContextualRewriter::resolve(&history(), "Why use that?"),
            "Why use X?"
        );
        // "this" as a determiner is left alone.
        assert_eq!(
            ContextualRewriter::resolve(&history(), "Does this page load?"),
            "Does this page load?"
        );
    }

    #[test]
    fn test_no_pronoun_unchanged() {
        assert_eq!(
            ContextualRewriter::resolve(&history(), "How do I reserve a node?"),
            "How do I reserve a node?"
        );
    }

    #[test]
    fn test_no_subject_unchanged() {
        let history = vec![Message::user("Hello there"), Message::assistant("Hi!")];
        assert_eq!(ContextualRewriter::resolve(&history, "Who made it?"), "Who made it?");
    }

    // ---- LlmQueryRewriter ----

    #[tokio::test]
    async fn test_llm_empty_history_skips_model() {
        let model = Arc::new(ScriptedChatModel::always("should not be used"));
        let r = LlmQueryRewriter::new(model.clone());
        assert_eq!(r.rewrite(&[], "What is X?").await.unwrap(), "What is X?");
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_llm_sends_prompt_history_and_question() {
        let model = Arc::new(ScriptedChatModel::always("  Who invented X?\n"));
        let r = LlmQueryRewriter::new(model.clone());
        let out = r.rewrite(&history(), "Who invented it?").await.unwrap();
        assert_eq!(out, "Who invented X?");

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        let sent = &calls[0];
        assert_eq!(sent[0].role, PromptRole::System);
        assert!(sent[0].content.contains("question-rewriting"));
        assert_eq!(sent[1].content, "What is X?");
        assert_eq!(sent[2].role, PromptRole::Assistant);
        assert_eq!(sent[3].content, "Who invented it?");
    }

    #[tokio::test]
    async fn test_llm_transport_error_is_rewrite_failure() {
        let model = Arc::new(ScriptedChatModel::failing(LlmError::Transport {
            message: "connection refused".into(),
            retryable: true,
        }));
        let r = LlmQueryRewriter::new(model);
        let err = r.rewrite(&history(), "Who invented it?").await.unwrap_err();
        assert!(matches!(err, ChatError::Rewrite(_)));
    }

    #[tokio::test]
    async fn test_llm_empty_reply_is_degenerate_not_error() {
        let model = Arc::new(ScriptedChatModel::new(vec![Err(LlmError::EmptyResponse)]));
        let r = LlmQueryRewriter::new(model);
        assert_eq!(r.rewrite(&history(), "Who invented it?").await.unwrap(), "");
    }
}
