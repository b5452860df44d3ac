//! Shared test transport: answers tool-enabled requests by calling every
//! advertised tool it has a canned payload for, and answers plain requests
//! with a fixed debate line. Failure injection and a cancel trigger cover
//! the failure-path scenarios.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use equity_agents::cancel::CancelHandle;
use equity_agents::config::Config;
use equity_agents::llm::{
    ChatCompletionApi, ChatReply, ChatRequest, ChatResponse, ToolCallRequest, TransportError,
};

pub struct AutoToolApi {
    payloads: HashMap<String, Value>,
    fail_tools: HashSet<String>,
    debate_text: String,
    pub calls: AtomicUsize,
    cancel_trigger: Mutex<Option<(usize, CancelHandle)>>,
}

impl AutoToolApi {
    pub fn new(payloads: HashMap<String, Value>) -> Self {
        AutoToolApi {
            payloads,
            fail_tools: HashSet::new(),
            debate_text: "I maintain my stance based on the data at hand.".to_string(),
            calls: AtomicUsize::new(0),
            cancel_trigger: Mutex::new(None),
        }
    }

    /// Requests advertising this tool fail with a transport error.
    pub fn fail_tool(mut self, tool: &str) -> Self {
        self.fail_tools.insert(tool.to_string());
        self
    }

    pub fn debate_text(mut self, text: &str) -> Self {
        self.debate_text = text.to_string();
        self
    }

    /// Fire the cancel handle when the 1-based call number `at` starts.
    pub fn cancel_at_call(self, at: usize, handle: CancelHandle) -> Self {
        *self.cancel_trigger.lock().unwrap() = Some((at, handle));
        self
    }
}

#[async_trait]
impl ChatCompletionApi for AutoToolApi {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, TransportError> {
        let call_number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let due = {
            let trigger = self.cancel_trigger.lock().unwrap();
            matches!(trigger.as_ref(), Some((at, _)) if call_number >= *at)
        };
        if due {
            if let Some((_, handle)) = self.cancel_trigger.lock().unwrap().take() {
                handle.cancel();
            }
        }

        let response = match &request.tools {
            Some(schemas) => {
                let names: Vec<String> = schemas
                    .iter()
                    .filter_map(|s| s["function"]["name"].as_str().map(str::to_string))
                    .collect();
                if names.iter().any(|name| self.fail_tools.contains(name)) {
                    return Err(TransportError::Server(500));
                }
                let calls: Vec<ToolCallRequest> = names
                    .iter()
                    .filter_map(|name| {
                        self.payloads.get(name).map(|payload| ToolCallRequest {
                            id: format!("call_{name}_{call_number}"),
                            name: name.clone(),
                            arguments: payload.to_string(),
                        })
                    })
                    .collect();
                if calls.is_empty() {
                    ChatResponse::Text {
                        content: "no applicable tool".to_string(),
                    }
                } else {
                    ChatResponse::ToolCalls {
                        content: String::new(),
                        calls,
                    }
                }
            }
            None => ChatResponse::Text {
                content: self.debate_text.clone(),
            },
        };
        Ok(ChatReply {
            response,
            total_tokens: 11,
        })
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

/// Canned emitter payloads for a full happy-path run.
pub fn default_payloads() -> HashMap<String, Value> {
    let mut payloads = HashMap::new();
    for (tool, recommendation, confidence) in [
        ("emit_fundamental_analysis", "BUY", 0.75),
        ("emit_technical_analysis", "BUY", 0.7),
        ("emit_sentiment_analysis", "HOLD", 0.6),
        ("emit_news_analysis", "BUY", 0.65),
    ] {
        payloads.insert(
            tool.to_string(),
            json!({
                "recommendation": recommendation,
                "confidence_score": confidence,
                "key_findings": ["finding one", "finding two"],
                "risk_factors": ["a risk"],
                "trend_direction": "up",
                "supporting_evidence": "supporting evidence text",
            }),
        );
    }
    payloads.insert(
        "emit_bull_research_result".to_string(),
        json!({"bull_thesis": "upside is real", "confidence_level": 0.7}),
    );
    payloads.insert(
        "emit_bear_research_result".to_string(),
        json!({"bear_thesis": "valuation is stretched", "confidence_level": 0.6}),
    );
    payloads.insert(
        "emit_debate_judgment".to_string(),
        json!({
            "decision": "BUY",
            "confidence": 0.65,
            "reasoning": "bull case carried",
            "winner": "bull",
        }),
    );
    payloads.insert(
        "emit_debate_quality_evaluation".to_string(),
        json!({"debate_quality": "good", "quality_score": 0.7}),
    );
    payloads.insert(
        "emit_trading_decision".to_string(),
        json!({
            "recommendation": "BUY",
            "confidence_score": 0.72,
            "position_size": 0.3,
            "target_price": 190.0,
            "stop_loss": 170.0,
            "take_profit": 210.0,
            "acceptable_price_min": 185.0,
            "acceptable_price_max": 195.0,
            "time_horizon": "medium",
            "reasoning": "analyst consensus plus debate verdict support entry",
        }),
    );
    payloads.insert(
        "emit_conservative_risk_analysis".to_string(),
        json!({"risk_assessment": "guard the downside", "risk_level": "MEDIUM", "confidence_level": 0.6}),
    );
    payloads.insert(
        "emit_aggressive_opportunity_analysis".to_string(),
        json!({"opportunity_assessment": "room to add", "upside_potential": "high", "confidence_level": 0.7}),
    );
    payloads.insert(
        "emit_neutral_balance_analysis".to_string(),
        json!({"balance_assessment": "acceptable trade-off", "risk_reward_ratio": "fair", "confidence_level": 0.65}),
    );
    payloads.insert(
        "emit_risk_management_decision".to_string(),
        json!({
            "recommended_action": "BUY",
            "risk_level": "MEDIUM",
            "confidence_level": 0.68,
            "position_adjustment": "keep at 0.3",
            "decision_rationale": "risks are manageable",
        }),
    );
    payloads.insert(
        "emit_fund_manager_decision".to_string(),
        json!({
            "final_recommendation": "BUY",
            "confidence_score": 0.74,
            "position_size": 0.25,
            "decision_summary": "committee agrees on a measured entry",
        }),
    );
    payloads
}

/// Fast-running configuration for tests: single retry attempt, two rounds.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.llm.api_key = "test-key".to_string();
    config.llm.retry_max_attempts = 1;
    config.llm.retry_base_seconds = 0.0;
    config.llm.retry_cap_seconds = 0.0;
    config.llm.timeout_seconds = 5;
    config.debate.research_team_max_rounds = 2;
    config.debate.risk_team_max_rounds = 3;
    config.workflow.max_tool_iterations = 3;
    config
}
