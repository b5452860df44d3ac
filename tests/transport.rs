//! OpenAI-compatible transport against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use equity_agents::cancel::CancelSignal;
use equity_agents::llm::{
    ChatCompletionApi, ChatMessage, ChatRequest, ChatResponse, LlmClient, LlmParams,
    OpenAiCompatClient, RetryPolicy, TransportError,
};

fn params() -> LlmParams {
    LlmParams {
        model: "test-model".to_string(),
        temperature: 0.0,
        max_tokens: 128,
        timeout: Duration::from_secs(5),
    }
}

fn request(messages: Vec<ChatMessage>) -> ChatRequest {
    ChatRequest {
        messages,
        tools: None,
        params: params(),
    }
}

#[tokio::test]
async fn text_completion_round_trips() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{"message": {"content": "hello there"}}],
                "usage": {"total_tokens": 42},
            }));
        })
        .await;

    let client = OpenAiCompatClient::new("deepseek", server.base_url(), "test-key");
    let reply = client
        .chat(&request(vec![ChatMessage::user("hi")]))
        .await
        .unwrap();

    assert_eq!(reply.total_tokens, 42);
    match reply.response {
        ChatResponse::Text { content } => assert_eq!(content, "hello there"),
        other => panic!("expected text, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn tool_calls_are_parsed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{"message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "emit_trading_decision",
                            "arguments": "{\"recommendation\":\"BUY\"}",
                        }
                    }]
                }}],
            }));
        })
        .await;

    let client = OpenAiCompatClient::new("deepseek", server.base_url(), "test-key");
    let reply = client
        .chat(&request(vec![ChatMessage::user("decide")]))
        .await
        .unwrap();

    match reply.response {
        ChatResponse::ToolCalls { calls, .. } => {
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].name, "emit_trading_decision");
            assert_eq!(calls[0].arguments, "{\"recommendation\":\"BUY\"}");
        }
        other => panic!("expected tool calls, got {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_are_retried_to_exhaustion() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503);
        })
        .await;

    let api = Arc::new(OpenAiCompatClient::new(
        "deepseek",
        server.base_url(),
        "test-key",
    ));
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };
    let client = LlmClient::new(api, params(), policy);

    let err = client
        .chat_completion(vec![ChatMessage::user("hi")], None, &CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Server(503)));
    assert_eq!(mock.hits_async().await, 3);
}

#[tokio::test]
async fn auth_failures_are_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401).body("invalid api key");
        })
        .await;

    let api = Arc::new(OpenAiCompatClient::new(
        "deepseek",
        server.base_url(),
        "bad-key",
    ));
    let policy = RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };
    let client = LlmClient::new(api, params(), policy);

    let err = client
        .chat_completion(vec![ChatMessage::user("hi")], None, &CancelSignal::never())
        .await
        .unwrap_err();
    match err {
        TransportError::Rejected { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("invalid api key"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn rate_limit_is_classified_retryable() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429);
        })
        .await;

    let api = Arc::new(OpenAiCompatClient::new(
        "deepseek",
        server.base_url(),
        "test-key",
    ));
    let policy = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };
    let client = LlmClient::new(api, params(), policy);

    let err = client
        .chat_completion(vec![ChatMessage::user("hi")], None, &CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::RateLimited));
    assert_eq!(mock.hits_async().await, 2);
}

#[tokio::test]
async fn tools_are_forwarded_in_the_request_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("\"tool_choice\":\"auto\"")
                .body_contains("emit_sample");
            then.status(200).json_body(json!({
                "choices": [{"message": {"content": "ok"}}],
            }));
        })
        .await;

    let client = OpenAiCompatClient::new("deepseek", server.base_url(), "test-key");
    let mut req = request(vec![ChatMessage::user("hi")]);
    req.tools = Some(vec![json!({
        "type": "function",
        "function": {"name": "emit_sample", "description": "", "parameters": {}},
    })]);
    client.chat(&req).await.unwrap();
    mock.assert_async().await;
}
