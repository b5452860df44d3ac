//! LLM transport: chat-completion messages, responses and the retrying
//! client wrapper. The wire shape follows the OpenAI chat-completion
//! protocol, which every provider this engine talks to speaks.

mod retry;
mod transport;

pub use retry::RetryPolicy;
pub use transport::{ChatCompletionApi, OpenAiCompatClient, TransportError};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::config::LlmConfig;

/// One chat message in the OpenAI wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    /// Assistant message carrying structured tool invocations.
    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: &[ToolCallRequest]) -> Self {
        ChatMessage {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls: Some(calls.iter().map(ToolCallPayload::from).collect()),
            tool_call_id: None,
        }
    }

    /// Tool result message answering one tool call.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: "tool".to_string(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        ChatMessage {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Wire form of a tool call inside an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: String,
}

impl From<&ToolCallRequest> for ToolCallPayload {
    fn from(call: &ToolCallRequest) -> Self {
        ToolCallPayload {
            id: call.id.clone(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

/// A tool invocation requested by the model. `arguments` is the raw string
/// returned upstream, typically JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// What the model answered: either plain text or a batch of tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatResponse {
    Text {
        content: String,
    },
    ToolCalls {
        content: String,
        calls: Vec<ToolCallRequest>,
    },
}

impl ChatResponse {
    pub fn content(&self) -> &str {
        match self {
            ChatResponse::Text { content } => content,
            ChatResponse::ToolCalls { content, .. } => content,
        }
    }
}

/// One completed upstream exchange, with token accounting when available.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: ChatResponse,
    pub total_tokens: u64,
}

/// Sampling and routing parameters for one call.
#[derive(Debug, Clone)]
pub struct LlmParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl LlmParams {
    pub fn from_config(config: &LlmConfig) -> Self {
        LlmParams {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        }
    }
}

/// Fully assembled request handed to a [`ChatCompletionApi`].
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Vec<Value>>,
    pub params: LlmParams,
}

/// Client used by agents: a transport plus retry policy and call params.
///
/// Retryable upstream failures (rate limit, timeout, connection loss, 5xx)
/// are re-attempted with bounded exponential backoff and jitter; everything
/// else surfaces immediately. Cancellation aborts both an in-flight attempt
/// and a backoff sleep.
#[derive(Clone)]
pub struct LlmClient {
    api: Arc<dyn ChatCompletionApi>,
    params: LlmParams,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(api: Arc<dyn ChatCompletionApi>, params: LlmParams, retry: RetryPolicy) -> Self {
        LlmClient { api, params, retry }
    }

    pub fn from_config(api: Arc<dyn ChatCompletionApi>, config: &LlmConfig) -> Self {
        LlmClient::new(api, LlmParams::from_config(config), RetryPolicy::from_config(config))
    }

    /// Same transport and retry policy, different model id. Used to build a
    /// debate pool out of one configured endpoint.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        let mut clone = self.clone();
        clone.params.model = model.into();
        clone
    }

    pub fn model(&self) -> &str {
        &self.params.model
    }

    pub fn provider(&self) -> &str {
        self.api.provider()
    }

    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<Value>>,
        cancel: &CancelSignal,
    ) -> Result<ChatReply, TransportError> {
        let request = ChatRequest {
            messages,
            tools,
            params: self.params.clone(),
        };

        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            let started = Instant::now();
            // Biased so a reply that is already complete wins over a
            // cancellation arriving in the same instant.
            let outcome = tokio::select! {
                biased;
                outcome = self.api.chat(&request) => outcome,
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            };
            let latency = started.elapsed();

            match outcome {
                Ok(reply) => {
                    debug!(
                        provider = self.api.provider(),
                        model = %self.params.model,
                        tokens = reply.total_tokens,
                        latency_ms = latency.as_millis() as u64,
                        success = true,
                        attempt,
                        "chat completion"
                    );
                    return Ok(reply);
                }
                Err(err) => {
                    debug!(
                        provider = self.api.provider(),
                        model = %self.params.model,
                        tokens = 0u64,
                        latency_ms = latency.as_millis() as u64,
                        success = false,
                        attempt,
                        error = %err,
                        "chat completion"
                    );
                    if !err.is_retryable() || attempt >= self.retry.max_attempts {
                        return Err(err);
                    }
                    let delay = self.retry.delay(attempt, &mut rand::thread_rng());
                    warn!(
                        provider = self.api.provider(),
                        model = %self.params.model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying chat completion"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// A pool of clients the debate coordinators draw from when model
/// randomization is enabled. Selection is uniform-random per turn; the
/// round-robin cursor is kept for callers that want determinism.
pub struct LlmPool {
    clients: Vec<LlmClient>,
    cursor: AtomicUsize,
}

impl LlmPool {
    pub fn new(clients: Vec<LlmClient>) -> Self {
        LlmPool {
            clients,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn next_round_robin(&self) -> Option<&LlmClient> {
        if self.clients.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        Some(&self.clients[idx])
    }

    pub fn pick_random(&self) -> Option<&LlmClient> {
        if self.clients.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..self.clients.len());
        Some(&self.clients[idx])
    }
}
