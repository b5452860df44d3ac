//! The trader agent.
//!
//! Consumes the analyst reports and the research-debate verdict, and emits
//! the [`TradingDecision`]. The prompt tells the trader its current position
//! so `position_size` always means an absolute target weight; a HOLD with an
//! existing position keeps that weight.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::analysts::string_list;
use super::{AgentCore, AgentRuntime};
use crate::artifacts::pretty;
use crate::cancel::CancelSignal;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::market_data::MarketData;
use crate::session::{AgentRole, AnalysisReport, Recommendation, TradingDecision};
use crate::tools::{emitters, ToolRegistry};

const SYSTEM_PROMPT: &str =
    "You are a professional equity trader. You weigh the analyst team's reports and \
     the research team's debate verdict, keep risk control ahead of conviction, and \
     size positions as absolute target portfolio weights. Commit your decision \
     through the emit_trading_decision tool.";

pub struct TraderContext<'a> {
    pub symbol: &'a str,
    pub reports: &'a BTreeMap<String, AnalysisReport>,
    pub debate_verdict: &'a Value,
    pub market: &'a MarketData,
    pub current_position_size: f64,
}

pub struct Trader {
    core: AgentCore,
}

impl Trader {
    pub fn new(llm: LlmClient, runtime: &AgentRuntime) -> Self {
        let core = AgentCore::new(
            AgentRole::Trader,
            SYSTEM_PROMPT,
            llm,
            ToolRegistry::new(vec![emitters::emit_trading_decision()]),
            "emit_trading_decision",
            runtime,
        );
        Trader { core }
    }

    #[instrument(skip(self, context, cancel), fields(symbol = context.symbol))]
    pub async fn process(
        &self,
        context: &TraderContext<'_>,
        cancel: &CancelSignal,
    ) -> Result<TradingDecision, AgentError> {
        self.core.reset_recorder();
        self.core.ensure_session(context.symbol);
        debug!("trading decision started");

        let prompt = self.build_prompt(context);
        match self.core.run_until_tool(&prompt, cancel).await {
            Ok(payload) => {
                let decision = self.wrap_decision(context, &payload);
                self.core.session().set_trading_decision(decision.clone());
                self.core.emit_chain(context.symbol, payload, true);
                self.core.log_output(
                    context.symbol,
                    "trading",
                    format!(
                        "**Decision**: {} (confidence {:.2}, target weight {:.2})\n\n{}",
                        decision.recommendation,
                        decision.confidence_score,
                        decision.position_size,
                        decision.reasoning
                    ),
                );
                Ok(decision)
            }
            Err(error) => {
                self.core.emit_chain(
                    context.symbol,
                    json!({"error": error.to_string()}),
                    false,
                );
                Err(error)
            }
        }
    }

    fn build_prompt(&self, context: &TraderContext<'_>) -> String {
        let reports: Value = context
            .reports
            .iter()
            .map(|(kind, report)| {
                (
                    kind.clone(),
                    serde_json::to_value(report).unwrap_or_else(|_| json!({})),
                )
            })
            .collect::<serde_json::Map<_, _>>()
            .into();
        format!(
            "Make the trading decision for the stock {symbol}.\n\n\
             Analyst team reports:\n{reports}\n\n\
             Research debate verdict:\n{verdict}\n\n\
             Market context:\n{market}\n\n\
             Your current position in {symbol} is {position:.2} of the portfolio. \
             The position_size you emit is the absolute target weight you want to \
             hold after this decision, not a change. If you recommend HOLD, the \
             target weight should equal the current position.\n\n\
             Decide BUY, HOLD or SELL with a target price, an acceptable entry range, \
             stop loss, take profit and an execution plan, then call the \
             emit_trading_decision tool.",
            symbol = context.symbol,
            reports = pretty(&reports),
            verdict = pretty(context.debate_verdict),
            market = pretty(&context.market.to_value()),
            position = context.current_position_size,
        )
    }

    fn wrap_decision(&self, context: &TraderContext<'_>, payload: &Value) -> TradingDecision {
        let recommendation = payload["recommendation"]
            .as_str()
            .and_then(|s| Recommendation::from_str(s).ok())
            .unwrap_or(Recommendation::Hold);
        let mut position_size = payload["position_size"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
        // HOLD means keep the current weight.
        if recommendation == Recommendation::Hold && context.current_position_size > 0.0 {
            position_size = context.current_position_size.clamp(0.0, 1.0);
        }
        let consensus: Value = context
            .reports
            .iter()
            .map(|(kind, report)| {
                (
                    kind.clone(),
                    json!({
                        "recommendation": report.recommendation.as_str(),
                        "confidence": report.confidence_score,
                    }),
                )
            })
            .collect::<serde_json::Map<_, _>>()
            .into();
        TradingDecision {
            symbol: context.symbol.to_string(),
            recommendation,
            confidence_score: payload["confidence_score"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
            target_price: payload["price_range"]["target_price"].as_f64().unwrap_or(0.0),
            stop_loss: payload["risk_management"]["stop_loss"].as_f64().unwrap_or(0.0),
            take_profit: payload["risk_management"]["take_profit"].as_f64().unwrap_or(0.0),
            position_size,
            acceptable_price_min: payload["price_range"]["acceptable_min"].as_f64().unwrap_or(0.0),
            acceptable_price_max: payload["price_range"]["acceptable_max"].as_f64().unwrap_or(0.0),
            time_horizon: payload["time_horizon"].as_str().unwrap_or_default().to_string(),
            reasoning: payload["reasoning"].as_str().unwrap_or_default().to_string(),
            risk_factors: string_list(&payload["risk_factors"]),
            execution_plan: payload["execution_plan"].clone(),
            decision_timestamp: Utc::now(),
            analyst_consensus: consensus,
            debate_influence: context.debate_verdict["decision"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedApi;
    use crate::artifacts::ArtifactHandle;
    use crate::conversation::ChainSequencer;
    use crate::llm::{LlmParams, RetryPolicy};
    use crate::session::SessionManager;
    use std::sync::Arc;
    use std::time::Duration;

    fn llm(api: ScriptedApi) -> LlmClient {
        LlmClient::new(
            Arc::new(api),
            LlmParams {
                model: "m".to_string(),
                temperature: 0.0,
                max_tokens: 64,
                timeout: Duration::from_secs(1),
            },
            RetryPolicy::none(),
        )
    }

    fn runtime() -> AgentRuntime {
        AgentRuntime::new(
            SessionManager::new(),
            ChainSequencer::new(),
            ArtifactHandle::disabled(),
            5,
        )
    }

    fn trader_response(recommendation: &str, position_size: f64) -> ScriptedApi {
        ScriptedApi::new(vec![ScriptedApi::tool_call(
            "emit_trading_decision",
            &format!(
                r#"{{"recommendation": "{recommendation}", "confidence_score": 0.72,
                     "position_size": {position_size}, "target_price": 190.0,
                     "stop_loss": 170.0, "take_profit": 210.0,
                     "acceptable_price_min": 185.0, "acceptable_price_max": 195.0,
                     "time_horizon": "medium", "reasoning": "balanced setup"}}"#
            ),
        )])
    }

    #[tokio::test]
    async fn buy_decision_carries_emitted_weight() {
        let trader = Trader::new(llm(trader_response("BUY", 0.3)), &runtime());
        let market = MarketData::new();
        let context = TraderContext {
            symbol: "AAPL",
            reports: &BTreeMap::new(),
            debate_verdict: &serde_json::json!({"decision": "BUY"}),
            market: &market,
            current_position_size: 0.0,
        };
        let decision = trader.process(&context, &CancelSignal::never()).await.unwrap();
        assert_eq!(decision.recommendation, Recommendation::Buy);
        assert!((decision.position_size - 0.3).abs() < 1e-9);
        assert_eq!(decision.debate_influence, "BUY");
        assert!((decision.target_price - 190.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn hold_keeps_current_weight() {
        let trader = Trader::new(llm(trader_response("HOLD", 0.05)), &runtime());
        let market = MarketData::new();
        let context = TraderContext {
            symbol: "AAPL",
            reports: &BTreeMap::new(),
            debate_verdict: &serde_json::json!({"decision": "HOLD"}),
            market: &market,
            current_position_size: 0.4,
        };
        let decision = trader.process(&context, &CancelSignal::never()).await.unwrap();
        assert_eq!(decision.recommendation, Recommendation::Hold);
        assert!((decision.position_size - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn hold_without_position_stays_at_emitted_weight() {
        let trader = Trader::new(llm(trader_response("HOLD", 0.0)), &runtime());
        let market = MarketData::new();
        let context = TraderContext {
            symbol: "AAPL",
            reports: &BTreeMap::new(),
            debate_verdict: &serde_json::json!({}),
            market: &market,
            current_position_size: 0.0,
        };
        let decision = trader.process(&context, &CancelSignal::never()).await.unwrap();
        assert_eq!(decision.position_size, 0.0);
    }
}
