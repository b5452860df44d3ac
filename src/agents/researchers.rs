//! Bull and bear researchers.
//!
//! Each produces an initial thesis through its emitter (`process`) and then
//! argues turns of the research debate (`debate`). Debate turns are plain
//! single-shot completions; the coordinator supplies the LLM for the turn
//! when model randomization is on.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::{AgentCore, AgentRuntime, DebateReply};
use crate::artifacts::pretty;
use crate::cancel::CancelSignal;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::market_data::MarketData;
use crate::session::{AgentRole, AnalysisReport};
use crate::tools::{emitters, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchStance {
    Bull,
    Bear,
}

impl ResearchStance {
    pub fn role(self) -> AgentRole {
        match self {
            ResearchStance::Bull => AgentRole::BullResearcher,
            ResearchStance::Bear => AgentRole::BearResearcher,
        }
    }

    fn terminal_tool(self) -> &'static str {
        match self {
            ResearchStance::Bull => "emit_bull_research_result",
            ResearchStance::Bear => "emit_bear_research_result",
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            ResearchStance::Bull => {
                "You are the bull researcher on an investment research team. You read \
                 the analyst reports looking for upside: growth drivers, undervaluation, \
                 positive catalysts and competitive advantages. In debate you rebut the \
                 bear case with specific data while staying professional. Commit your \
                 initial thesis through the emit_bull_research_result tool."
            }
            ResearchStance::Bear => {
                "You are the bear researcher on an investment research team. You read \
                 the analyst reports looking for downside: stretched valuation, \
                 deteriorating fundamentals, negative catalysts and structural problems. \
                 In debate you rebut the bull case with specific data while staying \
                 professional. Commit your initial thesis through the \
                 emit_bear_research_result tool."
            }
        }
    }

    fn opponent_label(self) -> &'static str {
        match self {
            ResearchStance::Bull => "bear",
            ResearchStance::Bear => "bull",
        }
    }
}

pub struct Researcher {
    core: AgentCore,
    stance: ResearchStance,
}

impl Researcher {
    pub fn new(stance: ResearchStance, llm: LlmClient, runtime: &AgentRuntime) -> Self {
        let emitter = match stance {
            ResearchStance::Bull => emitters::emit_bull_research_result(),
            ResearchStance::Bear => emitters::emit_bear_research_result(),
        };
        let core = AgentCore::new(
            stance.role(),
            stance.system_prompt(),
            llm,
            ToolRegistry::new(vec![emitter]),
            stance.terminal_tool(),
            runtime,
        );
        Researcher { core, stance }
    }

    pub fn stance(&self) -> ResearchStance {
        self.stance
    }

    pub fn role(&self) -> AgentRole {
        self.stance.role()
    }

    /// Produce the initial thesis from the analyst reports.
    #[instrument(skip(self, reports, market, cancel), fields(stance = ?self.stance))]
    pub async fn process(
        &self,
        symbol: &str,
        reports: &BTreeMap<String, AnalysisReport>,
        market: &MarketData,
        cancel: &CancelSignal,
    ) -> Result<Value, AgentError> {
        self.core.reset_recorder();
        self.core.ensure_session(symbol);
        debug!(symbol, "initial research started");

        let report_summaries: Value = reports
            .iter()
            .map(|(kind, report)| (kind.clone(), report.summary()))
            .collect::<serde_json::Map<_, _>>()
            .into();
        let prompt = format!(
            "Build your initial investment thesis for the stock {symbol}.\n\n\
             Analyst reports:\n{reports}\n\n\
             Market context:\n{market}\n\n\
             Work through the evidence from your stance's perspective, then call the \
             {tool} tool with your final thesis.",
            reports = pretty(&report_summaries),
            market = pretty(&market.to_value()),
            tool = self.stance.terminal_tool(),
        );

        match self.core.run_until_tool(&prompt, cancel).await {
            Ok(thesis) => {
                self.core.emit_chain(symbol, thesis.clone(), true);
                Ok(thesis)
            }
            Err(error) => {
                self.core
                    .emit_chain(symbol, json!({"error": error.to_string()}), false);
                Err(error)
            }
        }
    }

    /// One debate turn against the opponent's latest message. The optional
    /// `llm` override comes from the coordinator's pool selection.
    pub async fn debate(
        &self,
        topic: &str,
        opponent_message: &str,
        context: &Value,
        llm: Option<&LlmClient>,
        cancel: &CancelSignal,
    ) -> Result<DebateReply, AgentError> {
        self.core.reset_recorder();
        let prompt = format!(
            "Debate topic: {topic}\n\n\
             Opponent ({opponent}) argued:\n{opponent_message}\n\n\
             Context:\n{context}\n\n\
             Respond from your stance: identify the weaknesses in the opponent's \
             argument, bring new data or angles that support your side, and keep the \
             response focused and persuasive. Answer conversationally, no special \
             formatting.",
            opponent = self.stance.opponent_label(),
            context = pretty(context),
        );

        let symbol = context["symbol"].as_str().unwrap_or_default().to_string();
        match self.core.debate_turn(&prompt, llm, cancel).await {
            Ok(reply) => {
                self.core.emit_chain(
                    &symbol,
                    json!({"debate_response": reply.content, "topic": topic}),
                    true,
                );
                Ok(reply)
            }
            Err(error) => {
                self.core
                    .emit_chain(&symbol, json!({"error": error.to_string()}), false);
                Err(error)
            }
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

    #[tokio::test]
    async fn bull_process_returns_thesis() {
        let api = ScriptedApi::new(vec![ScriptedApi::tool_call(
            "emit_bull_research_result",
            r#"{"bull_thesis": "growth is underpriced", "confidence_level": 0.8}"#,
        )]);
        let researcher = Researcher::new(ResearchStance::Bull, llm(api), &runtime());
        let thesis = researcher
            .process(
                "AAPL",
                &BTreeMap::new(),
                &MarketData::new(),
                &CancelSignal::never(),
            )
            .await
            .unwrap();
        assert_eq!(thesis["bull_thesis"], "growth is underpriced");
    }

    #[tokio::test]
    async fn debate_uses_override_llm() {
        let api = ScriptedApi::new(vec![ScriptedApi::text("default model answer")]);
        let researcher = Researcher::new(ResearchStance::Bear, llm(api), &runtime());
        let override_api = ScriptedApi::new(vec![ScriptedApi::text("pool model answer")]);
        let override_llm = llm(override_api).with_model("pool-model");
        let reply = researcher
            .debate(
                "invest?",
                "the bull says buy",
                &serde_json::json!({"symbol": "AAPL"}),
                Some(&override_llm),
                &CancelSignal::never(),
            )
            .await
            .unwrap();
        assert_eq!(reply.content, "pool model answer");
        assert_eq!(reply.model, "pool-model");
    }
}
