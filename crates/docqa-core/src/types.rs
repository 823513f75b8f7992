use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Conversation
// =============================================================================

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The generated answer.
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs and the transcript.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a session's conversation log.
///
/// `position` is assigned by the session store on append and is strictly
/// increasing within one session, starting at 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub position: u64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Build an unpositioned message. The store overwrites `position`.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            position: 0,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Documents
// =============================================================================

/// A raw document as loaded from the documents directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// File name the text was read from.
    pub source_id: String,
    pub text: String,
}

impl SourceDocument {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// A bounded-size slice of a source document; the unit of retrieval.
///
/// `text` is never empty or whitespace-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub source_id: String,
    pub text: String,
    pub order_within_source: usize,
}

impl DocumentChunk {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>, order: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source_id.into(),
            text: text.into(),
            order_within_source: order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_role_display_matches_wire_name() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_message_constructors() {
        let u = Message::user("What is SPHERE?");
        assert_eq!(u.role, Role::User);
        assert_eq!(u.content, "What is SPHERE?");
        assert_eq!(u.position, 0);

        let a = Message::assistant("A research testbed.");
        assert_eq!(a.role, Role::Assistant);
    }

    #[test]
    fn test_message_deserializes() {
        let json = r#"{
            "role": "assistant",
            "content": "hi",
            "position": 3,
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.position, 3);
    }

    #[test]
    fn test_chunk_ids_are_unique() {
        let a = DocumentChunk::new("a.md", "alpha", 0);
        let b = DocumentChunk::new("a.md", "alpha", 0);
        assert_ne!(a.id, b.id);
        assert_eq!(a.source_id, "a.md");
    }
}
