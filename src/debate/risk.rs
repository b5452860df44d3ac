//! Risk debate: Conservative, Aggressive and Neutral analysts across N
//! rounds, adjudicated by the risk manager.
//!
//! The independent analyses run first (Conservative and Aggressive
//! concurrently, then Neutral with both results as added context). Each
//! round then proceeds Conservative -> Aggressive -> Neutral, with the
//! opponent-argument routing implemented in [`opponent_arguments`] as a pure
//! function so it can be checked in isolation. After a full round the
//! coordinator may end the debate early once enough content exists and the
//! recent exchange has become repetitive.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::agents::{AgentRuntime, RiskAnalyst, RiskManagerAgent, RiskStance};
use crate::artifacts::pretty;
use crate::cancel::CancelSignal;
use crate::error::AgentError;
use crate::market_data::MarketData;
use crate::session::{
    AgentRole, DebateKind, DebateMessage, RiskDecision, SessionManager, TradingDecision,
};

/// Minimum accumulated content before early termination may fire.
const MIN_CONTENT_BYTES: usize = 500;
/// Window of trailing messages inspected for repetition.
const REPETITION_WINDOW: usize = 6;
/// A single keyword occurring more than this often in the window fires the
/// repetition heuristic.
const MAX_KEYWORD_COUNT: usize = 3;
const REPETITION_KEYWORDS: [&str; 5] = ["risk", "return", "recommend", "believe", "should"];

/// One turn of the risk debate as the routing rule sees it.
#[derive(Debug, Clone)]
pub(crate) struct RiskTurn {
    pub round: u32,
    pub stance: RiskStance,
    pub content: String,
}

/// The three independent analyses that seed the debate.
#[derive(Debug, Clone)]
pub(crate) struct InitialAnalyses {
    pub conservative: Value,
    pub aggressive: Value,
    pub neutral: Value,
}

impl InitialAnalyses {
    fn for_stance(&self, stance: RiskStance) -> &Value {
        match stance {
            RiskStance::Conservative => &self.conservative,
            RiskStance::Aggressive => &self.aggressive,
            RiskStance::Neutral => &self.neutral,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskOutcome {
    pub decision: RiskDecision,
    pub raw_decision: Value,
    pub topic: String,
    pub rounds_completed: u32,
    pub terminated_early: bool,
    pub history: Vec<DebateMessage>,
    pub conservative_analysis: Value,
    pub aggressive_analysis: Value,
    pub neutral_analysis: Value,
}

pub struct RiskDebateCoordinator {
    conservative: RiskAnalyst,
    aggressive: RiskAnalyst,
    neutral: RiskAnalyst,
    manager: RiskManagerAgent,
    session: Arc<SessionManager>,
    max_rounds: u32,
}

impl RiskDebateCoordinator {
    pub fn new(
        conservative: RiskAnalyst,
        aggressive: RiskAnalyst,
        neutral: RiskAnalyst,
        manager: RiskManagerAgent,
        max_rounds: u32,
        runtime: &AgentRuntime,
    ) -> Self {
        debug_assert_eq!(conservative.stance(), RiskStance::Conservative);
        debug_assert_eq!(aggressive.stance(), RiskStance::Aggressive);
        debug_assert_eq!(neutral.stance(), RiskStance::Neutral);
        RiskDebateCoordinator {
            conservative,
            aggressive,
            neutral,
            manager,
            session: runtime.session.clone(),
            max_rounds,
        }
    }

    fn analyst(&self, stance: RiskStance) -> &RiskAnalyst {
        match stance {
            RiskStance::Conservative => &self.conservative,
            RiskStance::Aggressive => &self.aggressive,
            RiskStance::Neutral => &self.neutral,
        }
    }

    #[instrument(skip(self, decision, market, analysis_reports, cancel), fields(symbol = %decision.symbol))]
    pub async fn run(
        &self,
        decision: &TradingDecision,
        market: &MarketData,
        analysis_reports: &Value,
        cancel: &CancelSignal,
    ) -> Result<RiskOutcome, AgentError> {
        let symbol = decision.symbol.clone();
        let topic = format!(
            "Risk assessment of the trading decision: {} {}",
            decision.recommendation, symbol
        );
        self.session.start_risk_debate(
            vec![
                AgentRole::ConservativeAnalyst,
                AgentRole::AggressiveAnalyst,
                AgentRole::NeutralAnalyst,
            ],
            self.max_rounds,
            topic.clone(),
        );

        let decision_value = serde_json::to_value(decision).unwrap_or_else(|_| json!({}));
        let base_context = json!({
            "trading_decision": decision_value,
            "market_data": market.to_value(),
            "analysis_reports": analysis_reports,
        });

        // Independent analysis phase. Conservative and Aggressive run in
        // parallel; Neutral sees both results.
        debug!("independent risk analyses");
        let (conservative_analysis, aggressive_analysis) = tokio::try_join!(
            self.conservative.analyze(&symbol, &base_context, cancel),
            self.aggressive.analyze(&symbol, &base_context, cancel),
        )?;
        let mut neutral_context = base_context.clone();
        neutral_context["conservative_analysis"] = conservative_analysis.clone();
        neutral_context["aggressive_analysis"] = aggressive_analysis.clone();
        let neutral_analysis = self.neutral.analyze(&symbol, &neutral_context, cancel).await?;

        let initial = InitialAnalyses {
            conservative: conservative_analysis.clone(),
            aggressive: aggressive_analysis.clone(),
            neutral: neutral_analysis.clone(),
        };

        // Debate phase.
        let mut turns: Vec<RiskTurn> = Vec::new();
        let mut history: Vec<DebateMessage> = Vec::new();
        let mut rounds_completed = 0u32;
        let mut terminated_early = false;
        for round in 1..=self.max_rounds {
            debug!(round, "risk debate round");
            for stance in [
                RiskStance::Conservative,
                RiskStance::Aggressive,
                RiskStance::Neutral,
            ] {
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                let arguments = opponent_arguments(stance, round, &turns, &initial);
                let response = self
                    .analyst(stance)
                    .debate_response(&symbol, &topic, &arguments, cancel)
                    .await?;
                turns.push(RiskTurn {
                    round,
                    stance,
                    content: response.clone(),
                });
                history.push(self.session.add_debate_message(
                    DebateKind::Risk,
                    round,
                    stance.role(),
                    response,
                    None,
                    None,
                ));
            }
            rounds_completed = round;
            if round < self.max_rounds && should_end_debate(&turns) {
                info!(round, "risk debate terminated early");
                terminated_early = true;
                break;
            }
        }

        // Adjudication.
        let history_value: Value = turns
            .iter()
            .map(|turn| {
                json!({
                    "round": turn.round,
                    "speaker": turn.stance.display_name(),
                    "content": turn.content,
                })
            })
            .collect::<Vec<_>>()
            .into();
        let inputs = json!({
            "debate_history": history_value,
            "trading_decision": base_context["trading_decision"],
            "conservative_analysis": conservative_analysis,
            "aggressive_analysis": aggressive_analysis,
            "neutral_analysis": neutral_analysis,
            "market_data": base_context["market_data"],
        });
        let (risk_decision, raw_decision) =
            self.manager.adjudicate(&symbol, &topic, &inputs, cancel).await?;

        self.session.seal_debate(
            DebateKind::Risk,
            Some(risk_decision.recommended_action.as_str().to_string()),
            true,
            rounds_completed,
        );
        info!(
            symbol,
            action = %risk_decision.recommended_action,
            rounds = rounds_completed,
            "risk debate concluded"
        );

        Ok(RiskOutcome {
            decision: risk_decision,
            raw_decision,
            topic,
            rounds_completed,
            terminated_early,
            history,
            conservative_analysis,
            aggressive_analysis,
            neutral_analysis,
        })
    }
}

fn label_initial(stance: RiskStance, initial: &InitialAnalyses) -> String {
    format!(
        "{} (initial analysis): {}",
        stance.display_name(),
        pretty(initial.for_stance(stance))
    )
}

fn label_turn(turn: &RiskTurn) -> String {
    format!(
        "{} (round {}): {}",
        turn.stance.display_name(),
        turn.round,
        turn.content
    )
}

/// Route the opponent arguments for the next speaker. Pure function of the
/// speaker, the round, the history prefix and the initial analyses; same
/// inputs always produce byte-equal output.
pub(crate) fn opponent_arguments(
    speaker: RiskStance,
    round: u32,
    history: &[RiskTurn],
    initial: &InitialAnalyses,
) -> Vec<String> {
    if round == 1 {
        match speaker {
            // First word of the debate: only the other stances' initial
            // analyses exist.
            RiskStance::Conservative if history.is_empty() => vec![
                label_initial(RiskStance::Aggressive, initial),
                label_initial(RiskStance::Neutral, initial),
            ],
            RiskStance::Aggressive => {
                let conservative = history
                    .iter()
                    .rev()
                    .find(|t| t.stance == RiskStance::Conservative)
                    .map(label_turn)
                    .unwrap_or_else(|| label_initial(RiskStance::Conservative, initial));
                vec![conservative, label_initial(RiskStance::Neutral, initial)]
            }
            RiskStance::Neutral => {
                if history.is_empty() {
                    vec![
                        label_initial(RiskStance::Conservative, initial),
                        label_initial(RiskStance::Aggressive, initial),
                    ]
                } else {
                    history
                        .iter()
                        .filter(|t| t.stance != RiskStance::Neutral)
                        .map(label_turn)
                        .collect()
                }
            }
            _ => non_self_arguments(speaker, history),
        }
    } else {
        non_self_arguments(speaker, history)
    }
}

fn non_self_arguments(speaker: RiskStance, history: &[RiskTurn]) -> Vec<String> {
    history
        .iter()
        .filter(|t| t.stance != speaker)
        .map(label_turn)
        .collect()
}

/// Early-termination predicate, evaluated after a completed round. Requires
/// at least [`MIN_CONTENT_BYTES`] of accumulated content and at least
/// [`REPETITION_WINDOW`] messages; fires when any keyword occurs more than
/// [`MAX_KEYWORD_COUNT`] times across the trailing window.
pub(crate) fn should_end_debate(history: &[RiskTurn]) -> bool {
    let total_content: usize = history.iter().map(|t| t.content.len()).sum();
    if total_content < MIN_CONTENT_BYTES {
        return false;
    }
    if history.len() < REPETITION_WINDOW {
        return false;
    }
    let window = &history[history.len() - REPETITION_WINDOW..];
    let text = window
        .iter()
        .map(|t| t.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    REPETITION_KEYWORDS
        .iter()
        .any(|keyword| text.matches(keyword).count() > MAX_KEYWORD_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initial() -> InitialAnalyses {
        InitialAnalyses {
            conservative: json!({"risk_level": "HIGH"}),
            aggressive: json!({"upside_potential": "high"}),
            neutral: json!({"risk_reward_ratio": "fair"}),
        }
    }

    fn turn(round: u32, stance: RiskStance, content: &str) -> RiskTurn {
        RiskTurn {
            round,
            stance,
            content: content.to_string(),
        }
    }

    #[test]
    fn round_one_conservative_sees_other_initials() {
        let args = opponent_arguments(RiskStance::Conservative, 1, &[], &initial());
        assert_eq!(args.len(), 2);
        assert!(args[0].starts_with("Aggressive Analyst (initial analysis):"));
        assert!(args[1].starts_with("Neutral Analyst (initial analysis):"));
    }

    #[test]
    fn round_one_aggressive_sees_latest_conservative_and_neutral_initial() {
        let history = vec![turn(1, RiskStance::Conservative, "be careful")];
        let args = opponent_arguments(RiskStance::Aggressive, 1, &history, &initial());
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], "Conservative Analyst (round 1): be careful");
        assert!(args[1].starts_with("Neutral Analyst (initial analysis):"));
    }

    #[test]
    fn round_one_neutral_sees_both_speakers_in_temporal_order() {
        let history = vec![
            turn(1, RiskStance::Conservative, "be careful"),
            turn(1, RiskStance::Aggressive, "be bold"),
        ];
        let args = opponent_arguments(RiskStance::Neutral, 1, &history, &initial());
        assert_eq!(
            args,
            vec![
                "Conservative Analyst (round 1): be careful".to_string(),
                "Aggressive Analyst (round 1): be bold".to_string(),
            ]
        );
    }

    #[test]
    fn later_rounds_route_all_non_self_messages() {
        let history = vec![
            turn(1, RiskStance::Conservative, "c1"),
            turn(1, RiskStance::Aggressive, "a1"),
            turn(1, RiskStance::Neutral, "n1"),
            turn(2, RiskStance::Conservative, "c2"),
        ];
        let args = opponent_arguments(RiskStance::Aggressive, 2, &history, &initial());
        assert_eq!(
            args,
            vec![
                "Conservative Analyst (round 1): c1".to_string(),
                "Neutral Analyst (round 1): n1".to_string(),
                "Conservative Analyst (round 2): c2".to_string(),
            ]
        );
    }

    #[test]
    fn routing_is_deterministic() {
        let history = vec![
            turn(1, RiskStance::Conservative, "c1"),
            turn(1, RiskStance::Aggressive, "a1"),
        ];
        let a = opponent_arguments(RiskStance::Neutral, 1, &history, &initial());
        let b = opponent_arguments(RiskStance::Neutral, 1, &history, &initial());
        assert_eq!(a, b);
    }

    #[test]
    fn early_termination_needs_enough_content_and_messages() {
        // Plenty of repetition but too little content.
        let short: Vec<RiskTurn> = (0..6)
            .map(|i| turn(1, RiskStance::Conservative, if i % 2 == 0 { "risk" } else { "ok" }))
            .collect();
        assert!(!should_end_debate(&short));

        // Plenty of content but fewer than six messages.
        let few = vec![turn(1, RiskStance::Conservative, &"x".repeat(600))];
        assert!(!should_end_debate(&few));
    }

    #[test]
    fn early_termination_fires_on_keyword_repetition() {
        let filler = "a".repeat(120);
        let mut history: Vec<RiskTurn> = (0..5)
            .map(|_| turn(1, RiskStance::Conservative, &filler))
            .collect();
        history.push(turn(
            2,
            RiskStance::Neutral,
            "risk risk risk risk everywhere",
        ));
        assert!(should_end_debate(&history));
    }

    #[test]
    fn no_termination_without_repetition() {
        let filler = "balanced view without trigger words ".repeat(5);
        let history: Vec<RiskTurn> = (0..6)
            .map(|_| turn(1, RiskStance::Conservative, &filler))
            .collect();
        assert!(!should_end_debate(&history));
    }
}
