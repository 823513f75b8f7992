//! docqa LLM crate - chat model abstraction and an OpenAI-compatible client.

pub mod client;
pub mod error;
pub mod mock;
pub mod prompt;
pub mod retry;

pub use client::{ChatModel, OpenAiCompatClient};
pub use error::LlmError;
pub use mock::ScriptedChatModel;
pub use prompt::{build_conversation, PromptMessage, PromptRole};
pub use retry::RetryPolicy;
