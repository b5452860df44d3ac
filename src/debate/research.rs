//! Research debate: Bull vs Bear, then a judge pass.
//!
//! The state machine runs the two researchers' initial theses, exactly
//! `max_rounds` rounds of alternating turns (Bull first), a judge pass over
//! the coordinator's own `emit_debate_judgment` emitter and a quality
//! evaluation of the finished exchange. When model randomization is on, an
//! LLM is drawn from the pool before each turn and recorded on the message.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::agents::{AgentCore, AgentRuntime, Researcher};
use crate::artifacts::pretty;
use crate::cancel::CancelSignal;
use crate::error::AgentError;
use crate::llm::{LlmClient, LlmPool};
use crate::session::{
    AgentRole, AnalysisReport, DebateKind, DebateMessage, Recommendation, SessionManager,
};
use crate::tools::{emitters, ToolRegistry};

const JUDGE_PROMPT: &str =
    "You are the judge of an investment research debate between a bull and a bear \
     researcher. You weigh both theses, the exchange itself and the analyst team's \
     data, then rule on the investment decision. Commit the ruling through the \
     emit_debate_judgment tool.";

/// Sealed result of one research debate.
#[derive(Debug, Clone, Serialize)]
pub struct DebateOutcome {
    pub decision: Recommendation,
    pub confidence: f64,
    pub reasoning: String,
    pub winner: String,
    pub judgment: Value,
    pub bull_thesis: Value,
    pub bear_thesis: Value,
    pub history: Vec<DebateMessage>,
    pub quality: Option<Value>,
    pub consensus_reached: bool,
    pub rounds_completed: u32,
}

pub struct ResearchDebateCoordinator {
    bull: Researcher,
    bear: Researcher,
    judge: AgentCore,
    session: Arc<SessionManager>,
    pool: Option<LlmPool>,
    randomize_models: bool,
    max_rounds: u32,
    consensus_threshold: f64,
}

impl ResearchDebateCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bull: Researcher,
        bear: Researcher,
        judge_llm: LlmClient,
        pool: Option<LlmPool>,
        randomize_models: bool,
        max_rounds: u32,
        consensus_threshold: f64,
        runtime: &AgentRuntime,
    ) -> Self {
        let judge = AgentCore::new(
            AgentRole::DebateCoordinator,
            JUDGE_PROMPT,
            judge_llm,
            ToolRegistry::new(vec![
                emitters::emit_debate_judgment(),
                emitters::emit_debate_quality_evaluation(),
            ]),
            "emit_debate_judgment",
            runtime,
        );
        let randomize_models =
            randomize_models && pool.as_ref().map(|p| p.len() > 1).unwrap_or(false);
        ResearchDebateCoordinator {
            bull,
            bear,
            judge,
            session: runtime.session.clone(),
            pool,
            randomize_models,
            max_rounds,
            consensus_threshold,
        }
    }

    /// Draw the LLM for the next turn when randomization is enabled.
    fn select_llm(&self) -> Option<&LlmClient> {
        if !self.randomize_models {
            return None;
        }
        let selected = self.pool.as_ref()?.pick_random();
        if let Some(llm) = selected {
            info!(model = llm.model(), provider = llm.provider(), "debate model selected");
        }
        selected
    }

    #[instrument(skip(self, reports, market_context, cancel))]
    pub async fn run(
        &self,
        symbol: &str,
        reports: &BTreeMap<String, AnalysisReport>,
        market_context: &Value,
        cancel: &CancelSignal,
    ) -> Result<DebateOutcome, AgentError> {
        let topic = format!("Should we invest in the stock {symbol}?");
        self.session.start_research_debate(
            vec![AgentRole::BullResearcher, AgentRole::BearResearcher],
            self.max_rounds,
            topic.clone(),
        );

        // Initial theses, in sequence. Either failure ends the debate.
        let market = market_value_from(market_context);
        let bull_thesis = self.bull.process(symbol, reports, &market, cancel).await?;
        let bear_thesis = self.bear.process(symbol, reports, &market, cancel).await?;

        let serialized_reports: Value = reports
            .iter()
            .map(|(kind, report)| {
                (
                    kind.clone(),
                    serde_json::to_value(report).unwrap_or_else(|_| json!({})),
                )
            })
            .collect::<serde_json::Map<_, _>>()
            .into();
        let context = json!({
            "symbol": symbol,
            "analysis_reports": serialized_reports,
            "market_context": market_context,
        });

        let mut history: Vec<DebateMessage> = Vec::new();
        for round in 1..=self.max_rounds {
            debug!(round, "debate round");
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            // Bull speaks against the latest bear statement, or the bear's
            // initial thesis in round 1.
            let opponent = history
                .iter()
                .rev()
                .find(|m| m.speaker == AgentRole::BearResearcher)
                .map(|m| m.content.clone())
                .unwrap_or_else(|| pretty(&bear_thesis));
            let reply = self
                .bull
                .debate(&topic, &opponent, &context, self.select_llm(), cancel)
                .await?;
            history.push(self.session.add_debate_message(
                DebateKind::Research,
                round,
                AgentRole::BullResearcher,
                reply.content.clone(),
                Some(reply.model),
                Some(reply.provider),
            ));

            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            // Bear answers the bull message just produced.
            let reply = self
                .bear
                .debate(&topic, &reply.content, &context, self.select_llm(), cancel)
                .await?;
            history.push(self.session.add_debate_message(
                DebateKind::Research,
                round,
                AgentRole::BearResearcher,
                reply.content,
                Some(reply.model),
                Some(reply.provider),
            ));
        }

        if self.max_rounds > 0 && history.is_empty() {
            return Err(AgentError::DebateEmpty);
        }

        let judgment = self
            .judge_debate(symbol, &bull_thesis, &bear_thesis, &history, reports, cancel)
            .await?;
        let decision = judgment["decision"]
            .as_str()
            .and_then(|s| Recommendation::from_str(s).ok())
            .unwrap_or(Recommendation::Hold);
        let confidence = judgment["confidence"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0);
        let consensus_reached = confidence >= self.consensus_threshold;

        let quality = self.evaluate_quality(symbol, &history, cancel).await;

        self.session.seal_debate(
            DebateKind::Research,
            Some(decision.as_str().to_string()),
            consensus_reached,
            self.max_rounds,
        );
        info!(symbol, decision = %decision, confidence, "research debate concluded");

        Ok(DebateOutcome {
            decision,
            confidence,
            reasoning: judgment["reasoning"].as_str().unwrap_or_default().to_string(),
            winner: judgment["winner"].as_str().unwrap_or("draw").to_string(),
            judgment,
            bull_thesis,
            bear_thesis,
            history,
            quality,
            consensus_reached,
            rounds_completed: self.max_rounds,
        })
    }

    async fn judge_debate(
        &self,
        symbol: &str,
        bull_thesis: &Value,
        bear_thesis: &Value,
        history: &[DebateMessage],
        reports: &BTreeMap<String, AnalysisReport>,
        cancel: &CancelSignal,
    ) -> Result<Value, AgentError> {
        let history_text = history
            .iter()
            .map(|m| format!("Round {} - {}: {}", m.round, m.speaker.display_name(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let reports_value: Value = reports
            .iter()
            .map(|(kind, report)| (kind.clone(), report.summary()))
            .collect::<serde_json::Map<_, _>>()
            .into();
        let prompt = format!(
            "Rule on the investment debate for the stock {symbol}.\n\n\
             Analyst report summaries:\n{reports}\n\n\
             Bull thesis:\n{bull}\n\n\
             Bear thesis:\n{bear}\n\n\
             Debate:\n{history}\n\n\
             Evaluate the quality and persuasiveness of both sides against the \
             analysts' data, then call the emit_debate_judgment tool with the final \
             ruling.",
            reports = pretty(&reports_value),
            bull = pretty(bull_thesis),
            bear = pretty(bear_thesis),
            history = history_text,
        );

        self.judge.reset_recorder();
        match self.judge.run_until_tool(&prompt, cancel).await {
            Ok(judgment) => {
                self.judge.emit_chain(symbol, judgment.clone(), true);
                Ok(judgment)
            }
            Err(error) if error.is_cancelled() => Err(error),
            Err(error) => {
                // The judge could not produce a parseable ruling; fall back
                // to scoring the analyst reports directly.
                warn!(error = %error, "judge failed, using fallback scoring");
                self.judge
                    .emit_chain(symbol, json!({"error": error.to_string()}), false);
                Ok(fallback_judgment(reports))
            }
        }
    }

    async fn evaluate_quality(
        &self,
        symbol: &str,
        history: &[DebateMessage],
        cancel: &CancelSignal,
    ) -> Option<Value> {
        if history.is_empty() {
            return None;
        }
        let history_value =
            serde_json::to_value(history).unwrap_or_else(|_| json!([]));
        let prompt = format!(
            "Evaluate the quality of this finished research debate:\n\n{}\n\n\
             Judge argument logic, data support, clarity and rebuttal effectiveness \
             on both sides, then call the emit_debate_quality_evaluation tool.",
            pretty(&history_value),
        );
        self.judge.reset_recorder();
        match self
            .judge
            .run_until_named(&prompt, "emit_debate_quality_evaluation", cancel)
            .await
        {
            Ok(quality) => {
                self.judge.emit_chain(symbol, quality.clone(), true);
                Some(quality)
            }
            Err(error) => {
                warn!(error = %error, "debate quality evaluation failed");
                self.judge
                    .emit_chain(symbol, json!({"error": error.to_string()}), false);
                None
            }
        }
    }
}

/// Scoring rule used when the judge cannot produce a ruling: sum analyst
/// confidence behind BUY and behind SELL and compare the two. HOLD
/// recommendations never enter the comparison; they only weigh into the
/// confidence average. Ties resolve to HOLD.
fn fallback_judgment(reports: &BTreeMap<String, AnalysisReport>) -> Value {
    let mut buy = 0.0f64;
    let mut sell = 0.0f64;
    let mut total = 0.0f64;
    for report in reports.values() {
        match report.recommendation {
            Recommendation::Buy => buy += report.confidence_score,
            Recommendation::Sell => sell += report.confidence_score,
            Recommendation::Hold => {}
        }
        total += report.confidence_score;
    }

    let (decision, winner) = if buy > sell {
        (Recommendation::Buy, "bull")
    } else if sell > buy {
        (Recommendation::Sell, "bear")
    } else {
        (Recommendation::Hold, "draw")
    };
    let avg_confidence = if reports.is_empty() {
        0.5
    } else {
        total / reports.len() as f64
    };

    json!({
        "decision": decision.as_str(),
        "confidence": avg_confidence.min(0.8),
        "reasoning": format!(
            "Weighted analyst scoring: buy {buy:.2}, sell {sell:.2}"
        ),
        "supporting_factors": ["aggregate analyst assessment"],
        "risk_factors": ["judge ruling unavailable"],
        "investment_strategy": "follow the analyst consensus cautiously",
        "winner": winner,
        "winning_arguments": ["data-backed analyst consensus"],
    })
}

fn market_value_from(context: &Value) -> crate::market_data::MarketData {
    match context {
        Value::Object(map) => crate::market_data::MarketData::from_map(map.clone()),
        _ => crate::market_data::MarketData::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn report(recommendation: Recommendation, confidence: f64) -> AnalysisReport {
        AnalysisReport {
            analyst_role: AgentRole::TechnicalAnalyst,
            symbol: "AAPL".to_string(),
            analysis_date: Utc::now().date_naive(),
            key_findings: vec![],
            recommendation,
            confidence_score: confidence,
            risk_factors: vec![],
            time_horizon: BTreeMap::new(),
            impact_magnitude: 0.5,
            supporting_data: json!({}),
            detailed_analysis: String::new(),
            processing_time: 0.0,
        }
    }

    #[test]
    fn fallback_picks_weighted_majority() {
        let mut reports = BTreeMap::new();
        reports.insert("technical".to_string(), report(Recommendation::Buy, 0.8));
        reports.insert("news".to_string(), report(Recommendation::Sell, 0.3));
        let judgment = fallback_judgment(&reports);
        assert_eq!(judgment["decision"], "BUY");
        assert_eq!(judgment["winner"], "bull");
    }

    #[test]
    fn fallback_ignores_hold_confidence_in_the_comparison() {
        // HOLD weight never competes: a low-confidence BUY still beats an
        // empty SELL bucket even when HOLD confidence dominates both.
        let mut reports = BTreeMap::new();
        reports.insert("technical".to_string(), report(Recommendation::Buy, 0.3));
        reports.insert("sentiment".to_string(), report(Recommendation::Hold, 0.9));
        let judgment = fallback_judgment(&reports);
        assert_eq!(judgment["decision"], "BUY");
        assert_eq!(judgment["winner"], "bull");
    }

    #[test]
    fn fallback_ties_resolve_to_hold() {
        let mut reports = BTreeMap::new();
        reports.insert("technical".to_string(), report(Recommendation::Buy, 0.5));
        reports.insert("news".to_string(), report(Recommendation::Sell, 0.5));
        let judgment = fallback_judgment(&reports);
        assert_eq!(judgment["decision"], "HOLD");
        assert_eq!(judgment["winner"], "draw");
    }

    #[test]
    fn fallback_confidence_is_capped() {
        let mut reports = BTreeMap::new();
        reports.insert("technical".to_string(), report(Recommendation::Buy, 0.95));
        reports.insert("fundamental".to_string(), report(Recommendation::Buy, 0.95));
        let judgment = fallback_judgment(&reports);
        assert!(judgment["confidence"].as_f64().unwrap() <= 0.8);
    }

    #[test]
    fn fallback_without_reports_holds() {
        let judgment = fallback_judgment(&BTreeMap::new());
        assert_eq!(judgment["decision"], "HOLD");
        assert_eq!(judgment["confidence"], 0.5);
    }
}
