//! Scripted chat model for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::ChatModel;
use crate::error::LlmError;
use crate::prompt::PromptMessage;

/// Replays queued replies in order and records every request.
///
/// Once the script is exhausted the fallback reply is used, or
/// `EmptyResponse` if there is none.
#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<PromptMessage>>>,
}

impl ScriptedChatModel {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Always answer with `reply`.
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Always fail with `error`.
    pub fn failing(error: LlmError) -> Self {
        Self::new(std::iter::repeat(Err(error)).take(1024))
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Vec<PromptMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(reply) => reply,
            None => self.fallback.clone().ok_or(LlmError::EmptyResponse),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
