//! Risk team agents: the three debating stances and the risk manager.
//!
//! Each stance runs an independent analysis through its emitter and then
//! argues rounds of the risk debate with plain completions. The risk
//! manager adjudicates the sealed debate into a [`RiskDecision`].

use std::str::FromStr;

use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::analysts::string_list;
use super::{AgentCore, AgentRuntime};
use crate::artifacts::pretty;
use crate::cancel::CancelSignal;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::session::{AgentRole, Recommendation, RiskDecision, RiskLevel};
use crate::tools::{emitters, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskStance {
    Conservative,
    Aggressive,
    Neutral,
}

impl RiskStance {
    pub fn role(self) -> AgentRole {
        match self {
            RiskStance::Conservative => AgentRole::ConservativeAnalyst,
            RiskStance::Aggressive => AgentRole::AggressiveAnalyst,
            RiskStance::Neutral => AgentRole::NeutralAnalyst,
        }
    }

    pub fn display_name(self) -> &'static str {
        self.role().display_name()
    }

    fn terminal_tool(self) -> &'static str {
        match self {
            RiskStance::Conservative => "emit_conservative_risk_analysis",
            RiskStance::Aggressive => "emit_aggressive_opportunity_analysis",
            RiskStance::Neutral => "emit_neutral_balance_analysis",
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            RiskStance::Conservative => {
                "You are a conservative risk analyst. Capital preservation comes first: \
                 you probe the trading decision for downside scenarios, over-optimistic \
                 assumptions and concentration risk, and you argue for the cautious \
                 path. Commit your assessment through the \
                 emit_conservative_risk_analysis tool."
            }
            RiskStance::Aggressive => {
                "You are an aggressive risk analyst. Missed upside is also a risk: you \
                 probe the trading decision for underexploited opportunity, growth \
                 catalysts and timing advantages, and you argue for conviction. Commit \
                 your assessment through the emit_aggressive_opportunity_analysis tool."
            }
            RiskStance::Neutral => {
                "You are a neutral risk analyst. You weigh the conservative and \
                 aggressive cases against each other, looking for the balanced \
                 risk/reward position and what it would take to change it. Commit your \
                 assessment through the emit_neutral_balance_analysis tool."
            }
        }
    }

    fn analysis_instruction(self) -> &'static str {
        match self {
            RiskStance::Conservative => {
                "Assess the decision's downside: worst-case losses, fragile \
                 assumptions, timing risk, and what a safer alternative looks like."
            }
            RiskStance::Aggressive => {
                "Assess the decision's upside: opportunities it leaves on the table, \
                 catalysts that argue for more size, and why hesitation has a cost."
            }
            RiskStance::Neutral => {
                "Weigh both initial analyses against the data and judge where the \
                 balanced position lies, including the right position size."
            }
        }
    }
}

pub struct RiskAnalyst {
    core: AgentCore,
    stance: RiskStance,
}

impl RiskAnalyst {
    pub fn new(stance: RiskStance, llm: LlmClient, runtime: &AgentRuntime) -> Self {
        let emitter = match stance {
            RiskStance::Conservative => emitters::emit_conservative_risk_analysis(),
            RiskStance::Aggressive => emitters::emit_aggressive_opportunity_analysis(),
            RiskStance::Neutral => emitters::emit_neutral_balance_analysis(),
        };
        let core = AgentCore::new(
            stance.role(),
            stance.system_prompt(),
            llm,
            ToolRegistry::new(vec![emitter]),
            stance.terminal_tool(),
            runtime,
        );
        RiskAnalyst { core, stance }
    }

    pub fn stance(&self) -> RiskStance {
        self.stance
    }

    /// Independent analysis phase. `context` carries the trading decision,
    /// market data and analyst reports; the neutral analyst additionally
    /// receives the other two stances' results inside it.
    #[instrument(skip(self, context, cancel), fields(stance = ?self.stance))]
    pub async fn analyze(
        &self,
        symbol: &str,
        context: &Value,
        cancel: &CancelSignal,
    ) -> Result<Value, AgentError> {
        self.core.reset_recorder();
        self.core.ensure_session(symbol);
        debug!(symbol, "independent risk analysis started");

        let prompt = format!(
            "Evaluate the proposed trading decision for {symbol}.\n\n\
             Context:\n{context}\n\n\
             {instruction}\n\n\
             When done, call the {tool} tool with your structured assessment.",
            context = pretty(context),
            instruction = self.stance.analysis_instruction(),
            tool = self.stance.terminal_tool(),
        );

        match self.core.run_until_tool(&prompt, cancel).await {
            Ok(analysis) => {
                self.core.emit_chain(symbol, analysis.clone(), true);
                Ok(analysis)
            }
            Err(error) => {
                self.core
                    .emit_chain(symbol, json!({"error": error.to_string()}), false);
                Err(error)
            }
        }
    }

    /// One debate turn answering the routed opponent arguments.
    pub async fn debate_response(
        &self,
        symbol: &str,
        topic: &str,
        opponent_arguments: &[String],
        cancel: &CancelSignal,
    ) -> Result<String, AgentError> {
        self.core.reset_recorder();
        let opponents = opponent_arguments
            .iter()
            .map(|arg| format!("- {arg}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Debate topic: {topic}\n\n\
             Opponent arguments so far:\n{opponents}\n\n\
             Respond from your stance: point out what the opponents underweight, \
             support your position with the data at hand, and state what you would \
             change about the decision. Answer conversationally, no special \
             formatting."
        );

        match self.core.debate_turn(&prompt, None, cancel).await {
            Ok(reply) => {
                self.core.emit_chain(
                    symbol,
                    json!({"debate_response": reply.content, "topic": topic}),
                    true,
                );
                Ok(reply.content)
            }
            Err(error) => {
                self.core
                    .emit_chain(symbol, json!({"error": error.to_string()}), false);
                Err(error)
            }
        }
    }
}

const RISK_MANAGER_PROMPT: &str =
    "You are the risk management director. You have the full risk debate, the three \
     independent stance analyses and the trading decision in front of you. Judge the \
     arguments on their merits, decide the final action and risk controls, and commit \
     the verdict through the emit_risk_management_decision tool.";

pub struct RiskManagerAgent {
    core: AgentCore,
}

impl RiskManagerAgent {
    pub fn new(llm: LlmClient, runtime: &AgentRuntime) -> Self {
        let core = AgentCore::new(
            AgentRole::RiskManager,
            RISK_MANAGER_PROMPT,
            llm,
            ToolRegistry::new(vec![emitters::emit_risk_management_decision()]),
            "emit_risk_management_decision",
            runtime,
        );
        RiskManagerAgent { core }
    }

    /// Adjudicate the sealed debate. Returns the typed decision plus the raw
    /// emitter payload for logging.
    #[instrument(skip(self, inputs, cancel))]
    pub async fn adjudicate(
        &self,
        symbol: &str,
        topic: &str,
        inputs: &Value,
        cancel: &CancelSignal,
    ) -> Result<(RiskDecision, Value), AgentError> {
        self.core.reset_recorder();
        self.core.ensure_session(symbol);
        debug!(symbol, "risk adjudication started");

        let prompt = format!(
            "Adjudicate the risk debate for {symbol}.\n\n\
             Inputs:\n{inputs}\n\n\
             Weigh the three stances and the debate itself, then call the \
             emit_risk_management_decision tool with the final risk verdict.",
            inputs = pretty(inputs),
        );

        match self.core.run_until_tool(&prompt, cancel).await {
            Ok(payload) => {
                let decision = wrap_risk_decision(topic, &payload);
                self.core
                    .session()
                    .set_risk_management_decision(decision.clone());
                self.core.emit_chain(symbol, payload.clone(), true);
                self.core.log_output(
                    symbol,
                    "risk_management",
                    format!(
                        "**Action**: {} (risk {:?}, confidence {:.2})\n\n{}",
                        decision.recommended_action,
                        decision.risk_level,
                        decision.confidence_level,
                        decision.decision_rationale
                    ),
                );
                Ok((decision, payload))
            }
            Err(error) => {
                self.core
                    .emit_chain(symbol, json!({"error": error.to_string()}), false);
                Err(error)
            }
        }
    }
}

fn wrap_risk_decision(topic: &str, payload: &Value) -> RiskDecision {
    RiskDecision {
        recommended_action: payload["recommended_action"]
            .as_str()
            .and_then(|s| Recommendation::from_str(s).ok())
            .unwrap_or(Recommendation::Hold),
        risk_level: payload["risk_level"]
            .as_str()
            .and_then(|s| RiskLevel::from_str(s).ok())
            .unwrap_or(RiskLevel::Medium),
        confidence_level: payload["confidence_level"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
        position_adjustment: payload["position_adjustment"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        key_risk_factors: string_list(&payload["key_risk_factors"]),
        mitigation: string_list(&payload["risk_mitigation_measures"]),
        monitoring: string_list(&payload["monitoring_requirements"]),
        contingency_plans: string_list(&payload["contingency_plans"]),
        decision_rationale: payload["decision_rationale"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        debate_history_ref: topic.to_string(),
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

    #[tokio::test]
    async fn conservative_analysis_round_trips() {
        let api = ScriptedApi::new(vec![ScriptedApi::tool_call(
            "emit_conservative_risk_analysis",
            r#"{"risk_assessment": "elevated", "risk_level": "high",
                "confidence_level": 0.6}"#,
        )]);
        let analyst = RiskAnalyst::new(RiskStance::Conservative, llm(api), &runtime());
        let analysis = analyst
            .analyze("AAPL", &json!({"trading_decision": {}}), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(analysis["risk_level"], "HIGH");
    }

    #[tokio::test]
    async fn adjudication_wraps_typed_decision() {
        let api = ScriptedApi::new(vec![ScriptedApi::tool_call(
            "emit_risk_management_decision",
            r#"{"recommended_action": "buy", "risk_level": "medium",
                "confidence_level": 0.8, "position_adjustment": "trim to 0.2",
                "key_risk_factors": ["valuation"], "decision_rationale": "ok"}"#,
        )]);
        let runtime = runtime();
        let manager = RiskManagerAgent::new(llm(api), &runtime);
        runtime.session.start_session("AAPL");
        let (decision, _raw) = manager
            .adjudicate("AAPL", "risk of BUY", &json!({}), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(decision.recommended_action, Recommendation::Buy);
        assert_eq!(decision.risk_level, RiskLevel::Medium);
        assert_eq!(decision.debate_history_ref, "risk of BUY");
        let session = runtime.session.snapshot().unwrap();
        assert!(session.risk_management_decision.is_some());
    }
}
