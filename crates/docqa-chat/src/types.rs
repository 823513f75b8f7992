use chrono::{DateTime, Utc};
use docqa_core::types::Message;
use docqa_index::ScoredChunk;
use serde::{Deserialize, Serialize};

/// Stage of one question's trip through the workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Rewriting,
    Retrieving,
    Answering,
    Done,
    Failed,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Rewriting => "rewriting",
            WorkflowState::Retrieving => "retrieving",
            WorkflowState::Answering => "answering",
            WorkflowState::Done => "done",
            WorkflowState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved passage as reported back to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
    pub order_within_source: usize,
    pub score: f64,
}

impl From<&ScoredChunk> for SourceRef {
    fn from(hit: &ScoredChunk) -> Self {
        Self {
            source_id: hit.chunk.source_id.clone(),
            order_within_source: hit.chunk.order_within_source,
            score: hit.score,
        }
    }
}

/// Result of one successful submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub answer: String,
    pub rewritten_query: String,
    pub sources: Vec<SourceRef>,
    pub user_message: Message,
    pub assistant_message: Message,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::types::DocumentChunk;

    #[test]
    fn test_state_display() {
        assert_eq!(WorkflowState::Retrieving.to_string(), "retrieving");
        assert_eq!(WorkflowState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_source_ref_from_hit() {
        let hit = ScoredChunk {
            chunk: DocumentChunk::new("guide.md", "text", 2),
            score: 0.42,
        };
        let s = SourceRef::from(&hit);
        assert_eq!(s.source_id, "guide.md");
        assert_eq!(s.order_within_source, 2);
        assert!((s.score - 0.42).abs() < 1e-12);
    }
}
