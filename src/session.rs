//! Typed session artifacts and the session state manager.
//!
//! Every value that crosses a component boundary is a tagged type here;
//! free-form mappings only appear inside prompts. The manager owns the
//! active [`TradingSession`], serializes writes behind one lock, and treats
//! operations without an active session as silent no-ops.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    FundamentalAnalyst,
    TechnicalAnalyst,
    SentimentAnalyst,
    NewsAnalyst,
    BullResearcher,
    BearResearcher,
    DebateCoordinator,
    Trader,
    ConservativeAnalyst,
    AggressiveAnalyst,
    NeutralAnalyst,
    RiskManager,
    FundManager,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::FundamentalAnalyst => "fundamental_analyst",
            AgentRole::TechnicalAnalyst => "technical_analyst",
            AgentRole::SentimentAnalyst => "sentiment_analyst",
            AgentRole::NewsAnalyst => "news_analyst",
            AgentRole::BullResearcher => "bull_researcher",
            AgentRole::BearResearcher => "bear_researcher",
            AgentRole::DebateCoordinator => "debate_coordinator",
            AgentRole::Trader => "trader",
            AgentRole::ConservativeAnalyst => "conservative_analyst",
            AgentRole::AggressiveAnalyst => "aggressive_analyst",
            AgentRole::NeutralAnalyst => "neutral_analyst",
            AgentRole::RiskManager => "risk_manager",
            AgentRole::FundManager => "fund_manager",
        }
    }

    /// Human display name used in transcripts and debate labels.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::FundamentalAnalyst => "Fundamental Analyst",
            AgentRole::TechnicalAnalyst => "Technical Analyst",
            AgentRole::SentimentAnalyst => "Sentiment Analyst",
            AgentRole::NewsAnalyst => "News Analyst",
            AgentRole::BullResearcher => "Bull Researcher",
            AgentRole::BearResearcher => "Bear Researcher",
            AgentRole::DebateCoordinator => "Debate Coordinator",
            AgentRole::Trader => "Trader",
            AgentRole::ConservativeAnalyst => "Conservative Analyst",
            AgentRole::AggressiveAnalyst => "Aggressive Analyst",
            AgentRole::NeutralAnalyst => "Neutral Analyst",
            AgentRole::RiskManager => "Risk Manager",
            AgentRole::FundManager => "Fund Manager",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "HOLD")]
    Hold,
    #[serde(rename = "SELL")]
    Sell,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Buy => "BUY",
            Recommendation::Hold => "HOLD",
            Recommendation::Sell => "SELL",
        }
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Recommendation::Buy),
            "HOLD" => Ok(Recommendation::Hold),
            "SELL" => Ok(Recommendation::Sell),
            other => Err(format!("unknown recommendation `{other}`")),
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" | "MODERATE" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level `{other}`")),
        }
    }
}

/// Structured report produced by one analyst; written once per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analyst_role: AgentRole,
    pub symbol: String,
    pub analysis_date: NaiveDate,
    pub key_findings: Vec<String>,
    pub recommendation: Recommendation,
    pub confidence_score: f64,
    pub risk_factors: Vec<String>,
    pub time_horizon: BTreeMap<String, String>,
    pub impact_magnitude: f64,
    pub supporting_data: Value,
    pub detailed_analysis: String,
    pub processing_time: f64,
}

impl AnalysisReport {
    /// Short structured view for other agents' prompts.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "analyst": self.analyst_role.as_str(),
            "recommendation": self.recommendation.as_str(),
            "confidence": self.confidence_score,
            "key_findings": self.key_findings.iter().take(3).collect::<Vec<_>>(),
            "risk_factor_count": self.risk_factors.len(),
            "impact_magnitude": self.impact_magnitude,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateKind {
    Research,
    Risk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateMessage {
    pub round: u32,
    pub speaker: AgentRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateState {
    pub participants: Vec<AgentRole>,
    pub current_round: u32,
    pub max_rounds: u32,
    pub messages: Vec<DebateMessage>,
    pub consensus_reached: bool,
    pub final_decision: Option<String>,
    pub topic: String,
}

impl DebateState {
    fn new(participants: Vec<AgentRole>, max_rounds: u32, topic: String) -> Self {
        DebateState {
            participants,
            current_round: 0,
            max_rounds,
            messages: Vec::new(),
            consensus_reached: false,
            final_decision: None,
            topic,
        }
    }

    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.speaker.display_name(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingDecision {
    pub symbol: String,
    pub recommendation: Recommendation,
    pub confidence_score: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Absolute target portfolio weight, not a delta.
    pub position_size: f64,
    pub acceptable_price_min: f64,
    pub acceptable_price_max: f64,
    pub time_horizon: String,
    pub reasoning: String,
    pub risk_factors: Vec<String>,
    pub execution_plan: Value,
    pub decision_timestamp: DateTime<Utc>,
    pub analyst_consensus: Value,
    pub debate_influence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub recommended_action: Recommendation,
    pub risk_level: RiskLevel,
    pub confidence_level: f64,
    pub position_adjustment: String,
    pub key_risk_factors: Vec<String>,
    pub mitigation: Vec<String>,
    pub monitoring: Vec<String>,
    pub contingency_plans: Vec<String>,
    pub decision_rationale: String,
    pub debate_history_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentDecision {
    pub final_recommendation: Recommendation,
    pub confidence_score: f64,
    pub position_size: f64,
    pub entry_strategy: String,
    pub exit_strategy: String,
    pub risk_management_rules: Vec<String>,
    pub monitoring_indicators: Vec<String>,
    pub decision_summary: String,
    pub next_review_date: String,
}

/// The scope of one symbol's analysis lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct TradingSession {
    pub session_id: String,
    pub symbol: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub fundamental_report: Option<AnalysisReport>,
    pub technical_report: Option<AnalysisReport>,
    pub sentiment_report: Option<AnalysisReport>,
    pub news_report: Option<AnalysisReport>,
    pub research_debate: Option<DebateState>,
    pub risk_debate: Option<DebateState>,
    pub trading_decision: Option<TradingDecision>,
    pub risk_management_decision: Option<RiskDecision>,
    pub final_recommendation: Option<InvestmentDecision>,
    pub executed_trades: Vec<Value>,
    pub performance_metrics: BTreeMap<String, f64>,
}

impl TradingSession {
    fn new(symbol: &str) -> Self {
        let session_id = format!(
            "session_{}_{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            symbol
        );
        TradingSession {
            session_id,
            symbol: symbol.to_string(),
            start_time: Utc::now(),
            end_time: None,
            fundamental_report: None,
            technical_report: None,
            sentiment_report: None,
            news_report: None,
            research_debate: None,
            risk_debate: None,
            trading_decision: None,
            risk_management_decision: None,
            final_recommendation: None,
            executed_trades: Vec::new(),
            performance_metrics: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct ManagerState {
    current: Option<TradingSession>,
    history: Vec<TradingSession>,
}

/// In-memory owner of the active session. One instance per workflow; the
/// analyst fan-out publishes into it concurrently, so every mutation runs
/// under the manager's lock.
#[derive(Default)]
pub struct SessionManager {
    state: Mutex<ManagerState>,
}

impl SessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(SessionManager::default())
    }

    pub fn start_session(&self, symbol: &str) -> String {
        let mut state = self.lock();
        let session = TradingSession::new(symbol);
        let id = session.session_id.clone();
        debug!(session_id = %id, symbol, "session started");
        state.current = Some(session);
        id
    }

    /// Move the current session into history. No-op without a session.
    pub fn end_session(&self) {
        let mut state = self.lock();
        if let Some(mut session) = state.current.take() {
            session.end_time = Some(Utc::now());
            debug!(session_id = %session.session_id, "session ended");
            state.history.push(session);
        }
    }

    pub fn has_session(&self) -> bool {
        self.lock().current.is_some()
    }

    pub fn current_symbol(&self) -> Option<String> {
        self.lock().current.as_ref().map(|s| s.symbol.clone())
    }

    /// Consistent snapshot of the active session.
    pub fn snapshot(&self) -> Option<TradingSession> {
        self.lock().current.clone()
    }

    pub fn history_snapshot(&self) -> Vec<TradingSession> {
        self.lock().history.clone()
    }

    /// Route a report into its analyst slot. Second writes silently
    /// overwrite; operations without a session are no-ops.
    pub fn add_analysis_report(&self, report: AnalysisReport) {
        let mut state = self.lock();
        let Some(session) = state.current.as_mut() else {
            return;
        };
        let slot = match report.analyst_role {
            AgentRole::FundamentalAnalyst => &mut session.fundamental_report,
            AgentRole::TechnicalAnalyst => &mut session.technical_report,
            AgentRole::SentimentAnalyst => &mut session.sentiment_report,
            AgentRole::NewsAnalyst => &mut session.news_report,
            other => {
                debug!(role = %other, "ignoring report from non-analyst role");
                return;
            }
        };
        *slot = Some(report);
    }

    pub fn analysis_reports(&self) -> BTreeMap<String, AnalysisReport> {
        let state = self.lock();
        let mut reports = BTreeMap::new();
        if let Some(session) = state.current.as_ref() {
            let slots = [
                ("fundamental", &session.fundamental_report),
                ("technical", &session.technical_report),
                ("sentiment", &session.sentiment_report),
                ("news", &session.news_report),
            ];
            for (name, slot) in slots {
                if let Some(report) = slot {
                    reports.insert(name.to_string(), report.clone());
                }
            }
        }
        reports
    }

    pub fn start_research_debate(
        &self,
        participants: Vec<AgentRole>,
        max_rounds: u32,
        topic: String,
    ) -> DebateState {
        let debate = DebateState::new(participants, max_rounds, topic);
        let mut state = self.lock();
        if let Some(session) = state.current.as_mut() {
            session.research_debate = Some(debate.clone());
        }
        debate
    }

    pub fn start_risk_debate(
        &self,
        participants: Vec<AgentRole>,
        max_rounds: u32,
        topic: String,
    ) -> DebateState {
        let debate = DebateState::new(participants, max_rounds, topic);
        let mut state = self.lock();
        if let Some(session) = state.current.as_mut() {
            session.risk_debate = Some(debate.clone());
        }
        debate
    }

    /// Append a message in strict arrival order. Returns the stored message
    /// even when no session exists (the caller may still want it).
    pub fn add_debate_message(
        &self,
        kind: DebateKind,
        round: u32,
        speaker: AgentRole,
        content: String,
        model: Option<String>,
        provider: Option<String>,
    ) -> DebateMessage {
        let message = DebateMessage {
            round,
            speaker,
            content,
            timestamp: Utc::now(),
            model,
            provider,
        };
        let mut state = self.lock();
        if let Some(session) = state.current.as_mut() {
            let debate = match kind {
                DebateKind::Research => session.research_debate.as_mut(),
                DebateKind::Risk => session.risk_debate.as_mut(),
            };
            if let Some(debate) = debate {
                debate.current_round = debate.current_round.max(round);
                debate.messages.push(message.clone());
            }
        }
        message
    }

    /// Seal a debate with its outcome.
    pub fn seal_debate(
        &self,
        kind: DebateKind,
        final_decision: Option<String>,
        consensus_reached: bool,
        rounds_completed: u32,
    ) {
        let mut state = self.lock();
        if let Some(session) = state.current.as_mut() {
            let debate = match kind {
                DebateKind::Research => session.research_debate.as_mut(),
                DebateKind::Risk => session.risk_debate.as_mut(),
            };
            if let Some(debate) = debate {
                debate.current_round = rounds_completed.min(debate.max_rounds);
                debate.consensus_reached = consensus_reached;
                debate.final_decision = final_decision;
            }
        }
    }

    pub fn set_trading_decision(&self, decision: TradingDecision) {
        let mut state = self.lock();
        if let Some(session) = state.current.as_mut() {
            session.trading_decision = Some(decision);
        }
    }

    pub fn set_risk_management_decision(&self, decision: RiskDecision) {
        let mut state = self.lock();
        if let Some(session) = state.current.as_mut() {
            session.risk_management_decision = Some(decision);
        }
    }

    pub fn set_final_recommendation(&self, decision: InvestmentDecision) {
        let mut state = self.lock();
        if let Some(session) = state.current.as_mut() {
            session.final_recommendation = Some(decision);
        }
    }

    pub fn add_executed_trade(&self, trade: Value) {
        let mut state = self.lock();
        if let Some(session) = state.current.as_mut() {
            session.executed_trades.push(trade);
        }
    }

    pub fn update_performance_metrics(&self, metrics: BTreeMap<String, f64>) {
        let mut state = self.lock();
        if let Some(session) = state.current.as_mut() {
            session.performance_metrics.extend(metrics);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().expect("session lock poisoned")
    }
}
