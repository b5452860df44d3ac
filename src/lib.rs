//! Equity Agents is a multi-agent orchestration engine for equity trading
//! analysis.
//!
//! # Overview
//! Given a stock symbol and market data, the engine coordinates a fixed set
//! of LLM-backed agents through a staged pipeline that ends in a structured
//! investment decision. Analysts fan out in parallel, a bull/bear research
//! debate and a three-stance risk debate argue the case, and a trader plus
//! fund manager turn the arguments into decisions. Batch mode runs many
//! symbols concurrently over a bounded worker pool.
//!
//! # Architecture
//! - `llm`: chat-completion transport with retry/backoff and a model pool
//! - `tools`: tool registry, JSON-schema generation and the result emitters
//! - `conversation`: per-agent turn recording and call-chain artifacts
//! - `agents`: the tool-call loop plus the analyst, researcher, trader,
//!   risk and fund-manager agents
//! - `session`: typed artifacts and the session state manager
//! - `debate`: the research and risk debate state machines
//! - `workflow`: the staged orchestrator for one symbol
//! - `batch`: the portfolio analyzer
//! - `artifacts`: markdown/JSON audit logging off the hot path
//!
//! # Example
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use equity_agents::agents::AnalystKind;
//! use equity_agents::artifacts::ArtifactHandle;
//! use equity_agents::batch::BatchAnalyzer;
//! use equity_agents::cancel::CancelSignal;
//! use equity_agents::config::Config;
//! use equity_agents::llm::OpenAiCompatClient;
//! use equity_agents::market_data::StaticFetcher;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let api = Arc::new(OpenAiCompatClient::new(
//!     config.llm.provider.clone(),
//!     config.llm.base_url.clone(),
//!     config.llm.api_key.clone(),
//! ));
//! let fetcher = Arc::new(StaticFetcher::from_dir(&config.data.data_dir)?);
//! let analyzer = BatchAnalyzer::new(config.clone(), api, fetcher, ArtifactHandle::disabled());
//! let report = analyzer
//!     .analyze_portfolio(
//!         &["AAPL".to_string(), "MSFT".to_string()],
//!         &AnalystKind::ALL,
//!         &HashMap::new(),
//!         config.workflow.mode,
//!         &CancelSignal::never(),
//!     )
//!     .await;
//! println!("{}", report.to_csv());
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod artifacts;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod conversation;
pub mod debate;
pub mod error;
pub mod llm;
pub mod market_data;
pub mod session;
pub mod tools;
pub mod workflow;

pub use agents::AnalystKind;
pub use batch::{BatchAnalyzer, BatchReport};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::{Config, WorkflowMode};
pub use error::AgentError;
pub use session::{
    AgentRole, AnalysisReport, InvestmentDecision, Recommendation, RiskDecision, SessionManager,
    TradingDecision, TradingSession,
};
pub use workflow::{WorkflowOrchestrator, WorkflowRequest, WorkflowResult, WorkflowStage};
