//! Chat-completions client for OpenAI-compatible endpoints (Groq, OpenAI,
//! vLLM, llama.cpp server, ...).

use std::time::Duration;

use async_trait::async_trait;
use docqa_core::config::LlmConfig;
use reqwest::header::HeaderValue;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::prompt::PromptMessage;
use crate::retry::RetryPolicy;

/// A hosted or local chat model.
///
/// Returns the assistant's reply text for the given messages. Implementations
/// must not invent a reply on failure.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

pub struct OpenAiCompatClient {
    client: Client,
    endpoint: String,
    api_key: Secret<String>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatClient {
    /// `base_url` is the API root including the version segment, e.g.
    /// `https://api.groq.com/openai/v1`.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingCredential("API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport {
                message: format!("Failed to build HTTP client: {e}"),
                retryable: false,
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: Secret::new(api_key),
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            retry: RetryPolicy::default(),
        })
    }

    /// Build from configuration, resolving the API key from the environment
    /// or the config file.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .resolve_api_key()
            .map_err(|e| LlmError::MissingCredential(e.to_string()))?;
        Ok(Self::new(
            &config.base_url,
            api_key,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_retry(RetryPolicy::from_config(config)))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_request(&self, body: &ChatCompletionRequest<'_>) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|err| LlmError::Transport {
                message: format!("Chat completion request failed: {err}"),
                retryable: err.is_connect() || err.is_timeout(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, body_text, retry_after));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Decode(format!("Failed to parse completion: {err}")))?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        debug!(model = %self.model, messages = messages.len(), "Sending chat completion");
        self.retry.run(|| self.send_request(&request)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(LlmError::EmptyResponse)
}

fn map_http_error(status: StatusCode, body: String, retry_after: Option<Duration>) -> LlmError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    let retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );

    LlmError::Http {
        status: status.as_u16(),
        message,
        retryable,
        retry_after,
    }
}

/// Only the delay-seconds form of `Retry-After` is understood.
fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
