//! The fund manager: final decision authority in full mode.

use std::str::FromStr;

use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::analysts::string_list;
use super::{AgentCore, AgentRuntime};
use crate::artifacts::pretty;
use crate::cancel::CancelSignal;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::session::{AgentRole, InvestmentDecision, Recommendation};
use crate::tools::{emitters, ToolRegistry};

const SYSTEM_PROMPT: &str =
    "You are the fund manager with final decision authority. Everything the team \
     produced is in front of you: analyst reports, the research debate verdict, the \
     trader's plan and the risk verdict. Your job is the portfolio-level call: final \
     recommendation, position size, entry/exit strategy and the rules for managing \
     the position. Commit it through the emit_fund_manager_decision tool.";

pub struct FundManager {
    core: AgentCore,
}

impl FundManager {
    pub fn new(llm: LlmClient, runtime: &AgentRuntime) -> Self {
        let core = AgentCore::new(
            AgentRole::FundManager,
            SYSTEM_PROMPT,
            llm,
            ToolRegistry::new(vec![emitters::emit_fund_manager_decision()]),
            "emit_fund_manager_decision",
            runtime,
        );
        FundManager { core }
    }

    /// `inputs` bundles every prior artifact, serialized for the prompt.
    #[instrument(skip(self, inputs, cancel))]
    pub async fn process(
        &self,
        symbol: &str,
        inputs: &Value,
        cancel: &CancelSignal,
    ) -> Result<InvestmentDecision, AgentError> {
        self.core.reset_recorder();
        self.core.ensure_session(symbol);
        debug!(symbol, "final decision started");

        let prompt = format!(
            "Make the final investment decision for {symbol}.\n\n\
             Team output:\n{inputs}\n\n\
             Reconcile any disagreement between the trader and the risk manager, \
             decide the final recommendation and target weight, and call the \
             emit_fund_manager_decision tool.",
            inputs = pretty(inputs),
        );

        match self.core.run_until_tool(&prompt, cancel).await {
            Ok(payload) => {
                let decision = wrap_decision(&payload);
                self.core
                    .session()
                    .set_final_recommendation(decision.clone());
                self.core.emit_chain(symbol, payload, true);
                self.core.log_output(
                    symbol,
                    "final_decision",
                    format!(
                        "**Final recommendation**: {} (confidence {:.2}, weight {:.2})\n\n{}",
                        decision.final_recommendation,
                        decision.confidence_score,
                        decision.position_size,
                        decision.decision_summary
                    ),
                );
                Ok(decision)
            }
            Err(error) => {
                self.core
                    .emit_chain(symbol, json!({"error": error.to_string()}), false);
                Err(error)
            }
        }
    }
}

fn wrap_decision(payload: &Value) -> InvestmentDecision {
    InvestmentDecision {
        final_recommendation: payload["final_recommendation"]
            .as_str()
            .and_then(|s| Recommendation::from_str(s).ok())
            .unwrap_or(Recommendation::Hold),
        confidence_score: payload["confidence_score"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
        position_size: payload["position_size"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0),
        entry_strategy: payload["entry_strategy"].as_str().unwrap_or_default().to_string(),
        exit_strategy: payload["exit_strategy"].as_str().unwrap_or_default().to_string(),
        risk_management_rules: string_list(&payload["risk_management_rules"]),
        monitoring_indicators: string_list(&payload["monitoring_indicators"]),
        decision_summary: payload["decision_summary"].as_str().unwrap_or_default().to_string(),
        next_review_date: payload["next_review_date"].as_str().unwrap_or_default().to_string(),
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

    #[tokio::test]
    async fn final_decision_is_published_to_session() {
        let api = ScriptedApi::new(vec![ScriptedApi::tool_call(
            "emit_fund_manager_decision",
            r#"{"final_recommendation": "BUY", "confidence_score": 0.75,
                "position_size": 0.25, "decision_summary": "committee agrees"}"#,
        )]);
        let llm = LlmClient::new(
            Arc::new(api),
            LlmParams {
                model: "m".to_string(),
                temperature: 0.0,
                max_tokens: 64,
                timeout: Duration::from_secs(1),
            },
            RetryPolicy::none(),
        );
        let runtime = AgentRuntime::new(
            SessionManager::new(),
            ChainSequencer::new(),
            ArtifactHandle::disabled(),
            5,
        );
        let manager = FundManager::new(llm, &runtime);
        let decision = manager
            .process("AAPL", &json!({}), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(decision.final_recommendation, Recommendation::Buy);
        assert!((decision.position_size - 0.25).abs() < 1e-9);
        let session = runtime.session.snapshot().unwrap();
        assert!(session.final_recommendation.is_some());
    }
}
