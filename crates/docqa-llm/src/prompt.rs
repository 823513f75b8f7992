use docqa_core::types::{Message, Role};
use serde::{Deserialize, Serialize};

/// Role of a chat-completions message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl From<Role> for PromptRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => PromptRole::User,
            Role::Assistant => PromptRole::Assistant,
        }
    }
}

/// One message of a chat-completions request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Message> for PromptMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.into(),
            content: message.content.clone(),
        }
    }
}

/// System prompt, then the conversation history in order, then the new
/// user input.
pub fn build_conversation(system: String, history: &[Message], input: &str) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(system));
    messages.extend(history.iter().map(PromptMessage::from));
    messages.push(PromptMessage::user(input));
    messages
}
