use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use super::{ChatReply, ChatRequest, ChatResponse, ToolCallRequest};

/// Upstream failure classification. Retry eligibility is a property of the
/// kind, decided here once instead of at every call site.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rate limited")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("upstream server error: status {0}")]
    Server(u16),

    #[error("request rejected: status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited
                | TransportError::Timeout
                | TransportError::Connect(_)
                | TransportError::Server(_)
        )
    }
}

/// One chat-completion attempt against some provider. No retry here; the
/// [`super::LlmClient`] wrapper owns that policy.
#[async_trait]
pub trait ChatCompletionApi: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, TransportError>;

    /// Opaque provider identity for observability and debate metadata.
    fn provider(&self) -> &str;
}

/// Reqwest client for any OpenAI-compatible chat-completion endpoint
/// (DeepSeek, OpenAI, vLLM, ...).
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    provider: String,
}

impl OpenAiCompatClient {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        OpenAiCompatClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            provider: provider.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct WireCompletion {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[async_trait]
impl ChatCompletionApi for OpenAiCompatClient {
    #[instrument(skip(self, request), fields(provider = %self.provider, model = %request.params.model))]
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, TransportError> {
        let mut body = json!({
            "model": request.params.model,
            "messages": request.messages,
            "max_tokens": request.params.max_tokens,
            "temperature": request.params.temperature,
        });
        if let Some(tools) = &request.tools {
            body["tools"] = Value::Array(tools.clone());
            body["tool_choice"] = Value::String("auto".to_string());
        }

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(request.params.timeout)
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(TransportError::RateLimited);
        }
        if status.is_server_error() {
            return Err(TransportError::Server(status.as_u16()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let completion: WireCompletion = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Malformed("no choices in response".to_string()))?;
        let total_tokens = completion.usage.map(|u| u.total_tokens).unwrap_or(0);

        let content = choice.message.content.unwrap_or_default();
        let response = match choice.message.tool_calls {
            Some(calls) if !calls.is_empty() => {
                debug!(count = calls.len(), "tool calls requested");
                ChatResponse::ToolCalls {
                    content,
                    calls: calls
                        .into_iter()
                        .map(|c| ToolCallRequest {
                            id: c.id,
                            name: c.function.name,
                            arguments: c.function.arguments,
                        })
                        .collect(),
                }
            }
            _ => ChatResponse::Text { content },
        };

        Ok(ChatReply {
            response,
            total_tokens,
        })
    }

    fn provider(&self) -> &str {
        &self.provider
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Malformed(err.to_string())
    }
}
