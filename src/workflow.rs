//! Workflow orchestrator: drives one symbol through the staged pipeline.
//!
//! Quick mode: Analysis -> Debate -> Trading. Full mode adds Risk and the
//! fund manager's final decision. The analysis stage fans out one task per
//! selected analyst and succeeds if at least one analyst succeeds; every
//! other stage fails the workflow on failure. The orchestrator owns the
//! session lifecycle: a session is started on entry and ended on every exit
//! path, keeping whatever partial artifacts were published.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::agents::{
    Analyst, AnalystKind, AgentRuntime, FundManager, Researcher, ResearchStance, RiskAnalyst,
    RiskManagerAgent, RiskStance, Trader, TraderContext,
};
use crate::artifacts::{ArtifactEvent, ArtifactHandle};
use crate::cancel::CancelSignal;
use crate::config::{Config, WorkflowMode};
use crate::conversation::ChainSequencer;
use crate::debate::{DebateOutcome, ResearchDebateCoordinator, RiskDebateCoordinator, RiskOutcome};
use crate::error::AgentError;
use crate::llm::{ChatCompletionApi, LlmClient, LlmPool, OpenAiCompatClient};
use crate::market_data::MarketData;
use crate::session::{
    AnalysisReport, InvestmentDecision, Recommendation, SessionManager, TradingDecision,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStage {
    Initialization,
    Analysis,
    Debate,
    Trading,
    RiskManagement,
    FinalDecision,
    Completion,
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowStage::Initialization => "INITIALIZATION",
            WorkflowStage::Analysis => "ANALYSIS",
            WorkflowStage::Debate => "DEBATE",
            WorkflowStage::Trading => "TRADING",
            WorkflowStage::RiskManagement => "RISK_MANAGEMENT",
            WorkflowStage::FinalDecision => "FINAL_DECISION",
            WorkflowStage::Completion => "COMPLETION",
        };
        f.write_str(name)
    }
}

/// Input for one symbol's run.
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub symbol: String,
    pub market_data: MarketData,
    pub analyst_set: Vec<AnalystKind>,
    pub mode: WorkflowMode,
    pub current_position_size: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStageResult {
    pub reports: BTreeMap<String, AnalysisReport>,
    pub errors: Vec<String>,
}

/// User-visible outcome of one workflow run, carrying the per-stage
/// artifacts plus flattened decision fields for ranking and CSV output.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub session_id: String,
    pub symbol: String,
    pub stage: WorkflowStage,
    pub mode: WorkflowMode,
    pub error: Option<String>,
    pub analysis: Option<AnalysisStageResult>,
    pub debate: Option<DebateOutcome>,
    pub trading_decision: Option<TradingDecision>,
    pub risk_management: Option<RiskOutcome>,
    pub investment_decision: Option<InvestmentDecision>,
    pub recommendation: Option<Recommendation>,
    pub confidence_score: Option<f64>,
    pub target_price: Option<f64>,
    pub acceptable_price_min: Option<f64>,
    pub acceptable_price_max: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub position_size: Option<f64>,
    pub time_horizon: Option<String>,
    pub reasoning: Option<String>,
    pub execution_time: f64,
}

struct StageFailure {
    stage: WorkflowStage,
    error: String,
}

struct StageArtifacts {
    analysis: Option<AnalysisStageResult>,
    debate: Option<DebateOutcome>,
    trading: Option<TradingDecision>,
    risk: Option<RiskOutcome>,
    investment: Option<InvestmentDecision>,
}

impl StageArtifacts {
    fn empty() -> Self {
        StageArtifacts {
            analysis: None,
            debate: None,
            trading: None,
            risk: None,
            investment: None,
        }
    }
}

pub struct WorkflowOrchestrator {
    config: Config,
    runtime: AgentRuntime,
    artifacts: ArtifactHandle,
    analysts: HashMap<AnalystKind, Arc<Analyst>>,
    research_debate: ResearchDebateCoordinator,
    trader: Trader,
    risk_debate: RiskDebateCoordinator,
    fund_manager: FundManager,
}

impl WorkflowOrchestrator {
    /// Wire every agent from one transport. Tests inject scripted
    /// transports here; production callers use [`Self::from_config`].
    pub fn new(config: Config, api: Arc<dyn ChatCompletionApi>, artifacts: ArtifactHandle) -> Self {
        let session = SessionManager::new();
        let sequencer = ChainSequencer::new();
        let runtime = AgentRuntime::new(
            session,
            sequencer,
            artifacts.clone(),
            config.workflow.max_tool_iterations,
        );
        let llm = LlmClient::from_config(api, &config.llm);
        let http = reqwest::Client::new();

        let mut analysts = HashMap::new();
        for kind in AnalystKind::ALL {
            analysts.insert(
                kind,
                Arc::new(Analyst::new(kind, llm.clone(), http.clone(), &runtime)),
            );
        }

        let pool = if config.debate.models.is_empty() {
            None
        } else {
            Some(LlmPool::new(
                config
                    .debate
                    .models
                    .iter()
                    .map(|model| llm.with_model(model.as_str()))
                    .collect(),
            ))
        };
        let research_debate = ResearchDebateCoordinator::new(
            Researcher::new(ResearchStance::Bull, llm.clone(), &runtime),
            Researcher::new(ResearchStance::Bear, llm.clone(), &runtime),
            llm.clone(),
            pool,
            config.debate.randomize_models,
            config.debate.research_team_max_rounds,
            config.debate.min_consensus_threshold,
            &runtime,
        );
        let risk_debate = RiskDebateCoordinator::new(
            RiskAnalyst::new(RiskStance::Conservative, llm.clone(), &runtime),
            RiskAnalyst::new(RiskStance::Aggressive, llm.clone(), &runtime),
            RiskAnalyst::new(RiskStance::Neutral, llm.clone(), &runtime),
            RiskManagerAgent::new(llm.clone(), &runtime),
            config.debate.risk_team_max_rounds,
            &runtime,
        );
        let trader = Trader::new(llm.clone(), &runtime);
        let fund_manager = FundManager::new(llm, &runtime);

        WorkflowOrchestrator {
            config,
            runtime,
            artifacts,
            analysts,
            research_debate,
            trader,
            risk_debate,
            fund_manager,
        }
    }

    /// Production wiring: an OpenAI-compatible transport from config.
    pub fn from_config(config: Config, artifacts: ArtifactHandle) -> Self {
        let api: Arc<dyn ChatCompletionApi> = Arc::new(OpenAiCompatClient::new(
            config.llm.provider.clone(),
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
        ));
        WorkflowOrchestrator::new(config, api, artifacts)
    }

    pub fn session_manager(&self) -> Arc<SessionManager> {
        self.runtime.session.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[instrument(skip(self, request, cancel), fields(symbol = %request.symbol, mode = %request.mode))]
    pub async fn run(&self, request: WorkflowRequest, cancel: &CancelSignal) -> WorkflowResult {
        let started = Instant::now();
        let symbol = request.symbol.clone();
        let session_id = self.runtime.session.start_session(&symbol);
        info!(session_id = %session_id, "workflow started");
        self.stage_marker(
            &symbol,
            "WORKFLOW_START",
            format!("session {session_id}, analysts: {}", analyst_keys(&request.analyst_set)),
            true,
        );

        let mut market = request.market_data.clone();
        market.set_current_position_size(request.current_position_size);

        let mut artifacts = StageArtifacts::empty();
        let outcome = self
            .execute_stages(&request, &market, &mut artifacts, cancel)
            .await;
        self.runtime.session.end_session();

        let execution_time = started.elapsed().as_secs_f64();
        match outcome {
            Ok(()) => {
                self.stage_marker(&symbol, "WORKFLOW_COMPLETE", String::new(), true);
                self.success_result(session_id, symbol, request.mode, artifacts, execution_time)
            }
            Err(failure) => {
                warn!(stage = %failure.stage, error = %failure.error, "workflow failed");
                self.stage_marker(
                    &symbol,
                    "WORKFLOW_FAILED",
                    format!("{}: {}", failure.stage, failure.error),
                    false,
                );
                self.failure_result(
                    session_id,
                    symbol,
                    request.mode,
                    failure,
                    artifacts,
                    execution_time,
                )
            }
        }
    }

    async fn execute_stages(
        &self,
        request: &WorkflowRequest,
        market: &MarketData,
        artifacts: &mut StageArtifacts,
        cancel: &CancelSignal,
    ) -> Result<(), StageFailure> {
        let symbol = &request.symbol;

        // Analysis stage (fan-out).
        self.stage_marker(symbol, "ANALYSIS", "analyst fan-out started".to_string(), true);
        let analysis = self.run_analysis_stage(request, market, cancel).await?;
        self.stage_marker(
            symbol,
            "ANALYSIS",
            format!(
                "{} reports, {} failures",
                analysis.reports.len(),
                analysis.errors.len()
            ),
            true,
        );
        artifacts.analysis = Some(analysis);
        let reports = artifacts.analysis.as_ref().map(|a| a.reports.clone()).unwrap_or_default();

        // Debate stage.
        self.stage_marker(symbol, "DEBATE", "research debate started".to_string(), true);
        let debate = self
            .research_debate
            .run(symbol, &reports, &market.to_value(), cancel)
            .await
            .map_err(|e| stage_failure(WorkflowStage::Debate, e))?;
        self.stage_marker(
            symbol,
            "DEBATE",
            format!("verdict {} ({:.2})", debate.decision, debate.confidence),
            true,
        );
        artifacts.debate = Some(debate);

        // Trading stage.
        self.stage_marker(symbol, "TRADING", "trader decision started".to_string(), true);
        let verdict = artifacts
            .debate
            .as_ref()
            .map(|d| d.judgment.clone())
            .unwrap_or_else(|| json!({}));
        let trading = self
            .trader
            .process(
                &TraderContext {
                    symbol,
                    reports: &reports,
                    debate_verdict: &verdict,
                    market,
                    current_position_size: request.current_position_size,
                },
                cancel,
            )
            .await
            .map_err(|e| stage_failure(WorkflowStage::Trading, e))?;
        self.stage_marker(
            symbol,
            "TRADING",
            format!(
                "{} at weight {:.2}",
                trading.recommendation, trading.position_size
            ),
            true,
        );
        artifacts.trading = Some(trading);

        if request.mode == WorkflowMode::Quick {
            return Ok(());
        }

        // Risk stage (full mode).
        self.stage_marker(symbol, "RISK_MANAGEMENT", "risk debate started".to_string(), true);
        let reports_value: Value = reports
            .iter()
            .map(|(kind, report)| {
                (
                    kind.clone(),
                    serde_json::to_value(report).unwrap_or_else(|_| json!({})),
                )
            })
            .collect::<serde_json::Map<_, _>>()
            .into();
        let trading_ref = artifacts.trading.as_ref().expect("trading stage completed");
        let risk = self
            .risk_debate
            .run(trading_ref, market, &reports_value, cancel)
            .await
            .map_err(|e| stage_failure(WorkflowStage::RiskManagement, e))?;
        self.stage_marker(
            symbol,
            "RISK_MANAGEMENT",
            format!(
                "{} ({} rounds)",
                risk.decision.recommended_action, risk.rounds_completed
            ),
            true,
        );
        artifacts.risk = Some(risk);

        // Final stage (full mode).
        self.stage_marker(symbol, "FINAL_DECISION", "fund manager started".to_string(), true);
        let inputs = json!({
            "symbol": symbol,
            "analysis_reports": reports_value,
            "debate_result": artifacts.debate.as_ref().map(|d| d.judgment.clone()),
            "trading_decision": serde_json::to_value(trading_ref).unwrap_or_else(|_| json!({})),
            "risk_assessment": artifacts.risk.as_ref().map(|r| r.raw_decision.clone()),
            "market_context": market.to_value(),
        });
        let investment = self
            .fund_manager
            .process(symbol, &inputs, cancel)
            .await
            .map_err(|e| stage_failure(WorkflowStage::FinalDecision, e))?;
        self.stage_marker(
            symbol,
            "FINAL_DECISION",
            format!(
                "{} (confidence {:.2})",
                investment.final_recommendation, investment.confidence_score
            ),
            true,
        );
        artifacts.investment = Some(investment);
        Ok(())
    }

    /// Fan out one task per selected analyst. The stage succeeds when at
    /// least one analyst succeeds; individual failures are collected.
    async fn run_analysis_stage(
        &self,
        request: &WorkflowRequest,
        market: &MarketData,
        cancel: &CancelSignal,
    ) -> Result<AnalysisStageResult, StageFailure> {
        if request.analyst_set.is_empty() {
            return Err(StageFailure {
                stage: WorkflowStage::Analysis,
                error: "no analysts selected".to_string(),
            });
        }
        if market.has_error() {
            return Err(StageFailure {
                stage: WorkflowStage::Analysis,
                error: format!(
                    "market data invalid: {}",
                    market.error_message().unwrap_or_default()
                ),
            });
        }

        let mut handles = Vec::new();
        for kind in &request.analyst_set {
            let Some(analyst) = self.analysts.get(kind).cloned() else {
                continue;
            };
            let kind = *kind;
            let symbol = request.symbol.clone();
            let context = self.analyst_context(kind, market);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let result = analyst.process(&symbol, &context, &cancel).await;
                (kind, result)
            }));
        }

        let mut reports = BTreeMap::new();
        let mut errors = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((kind, Ok(report))) => {
                    info!(analyst = kind.key(), "analyst finished");
                    reports.insert(kind.key().to_string(), report);
                }
                Ok((kind, Err(error))) => {
                    warn!(analyst = kind.key(), error = %error, "analyst failed");
                    errors.push(format!("{}: {}", kind.key(), error));
                }
                Err(join_error) => errors.push(format!("analyst task panicked: {join_error}")),
            }
        }

        if cancel.is_cancelled() {
            return Err(StageFailure {
                stage: WorkflowStage::Analysis,
                error: "cancelled".to_string(),
            });
        }
        if reports.is_empty() {
            return Err(StageFailure {
                stage: WorkflowStage::Analysis,
                error: format!("all analysts failed: {}", errors.join("; ")),
            });
        }
        Ok(AnalysisStageResult { reports, errors })
    }

    /// Analyst-specific context. The sentiment analyst gets the two
    /// reserved sub-mappings, synthesized when the market data lacks them;
    /// everyone else sees the market data unchanged.
    fn analyst_context(&self, kind: AnalystKind, market: &MarketData) -> MarketData {
        let mut context = market.clone();
        if kind == AnalystKind::Sentiment {
            if context.sub_mapping("social_media_data").is_none() {
                context.insert(
                    "social_media_data",
                    json!({
                        "reddit_posts": 150,
                        "twitter_mentions": 300,
                        "positive_ratio": 0.65,
                    }),
                );
            }
            if context.sub_mapping("sentiment_indicators").is_none() {
                context.insert(
                    "sentiment_indicators",
                    json!({
                        "vix": 18.5,
                        "put_call_ratio": 0.8,
                        "fear_greed_index": 70,
                    }),
                );
            }
        }
        context
    }

    fn stage_marker(&self, symbol: &str, stage: &str, content: String, success: bool) {
        self.artifacts.publish(ArtifactEvent::StageMarker {
            symbol: symbol.to_string(),
            stage: stage.to_string(),
            content,
            success,
        });
    }

    fn success_result(
        &self,
        session_id: String,
        symbol: String,
        mode: WorkflowMode,
        artifacts: StageArtifacts,
        execution_time: f64,
    ) -> WorkflowResult {
        let trading = artifacts.trading.clone();
        let (recommendation, confidence, position) = match (mode, &artifacts.investment, &trading) {
            (WorkflowMode::Full, Some(investment), _) => (
                Some(investment.final_recommendation),
                Some(investment.confidence_score),
                Some(investment.position_size),
            ),
            (_, _, Some(decision)) => (
                Some(decision.recommendation),
                Some(decision.confidence_score),
                Some(decision.position_size),
            ),
            _ => (None, None, None),
        };
        WorkflowResult {
            success: true,
            session_id,
            symbol,
            stage: WorkflowStage::Completion,
            mode,
            error: None,
            analysis: artifacts.analysis,
            debate: artifacts.debate,
            risk_management: artifacts.risk,
            investment_decision: artifacts.investment,
            recommendation,
            confidence_score: confidence,
            position_size: position,
            target_price: trading.as_ref().map(|d| d.target_price),
            acceptable_price_min: trading.as_ref().map(|d| d.acceptable_price_min),
            acceptable_price_max: trading.as_ref().map(|d| d.acceptable_price_max),
            take_profit: trading.as_ref().map(|d| d.take_profit),
            stop_loss: trading.as_ref().map(|d| d.stop_loss),
            time_horizon: trading.as_ref().map(|d| d.time_horizon.clone()),
            reasoning: trading.as_ref().map(|d| d.reasoning.clone()),
            trading_decision: trading,
            execution_time,
        }
    }

    fn failure_result(
        &self,
        session_id: String,
        symbol: String,
        mode: WorkflowMode,
        failure: StageFailure,
        artifacts: StageArtifacts,
        execution_time: f64,
    ) -> WorkflowResult {
        WorkflowResult {
            success: false,
            session_id,
            symbol,
            stage: failure.stage,
            mode,
            error: Some(failure.error),
            analysis: artifacts.analysis,
            debate: artifacts.debate,
            trading_decision: artifacts.trading,
            risk_management: artifacts.risk,
            investment_decision: artifacts.investment,
            recommendation: None,
            confidence_score: None,
            target_price: None,
            acceptable_price_min: None,
            acceptable_price_max: None,
            take_profit: None,
            stop_loss: None,
            position_size: None,
            time_horizon: None,
            reasoning: None,
            execution_time,
        }
    }
}

fn stage_failure(stage: WorkflowStage, error: AgentError) -> StageFailure {
    let error = if error.is_cancelled() {
        "cancelled".to_string()
    } else {
        error.to_string()
    };
    StageFailure { stage, error }
}

fn analyst_keys(set: &[AnalystKind]) -> String {
    set.iter().map(|k| k.key()).collect::<Vec<_>>().join(", ")
}
