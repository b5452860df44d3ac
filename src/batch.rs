//! Batch portfolio analysis: many symbols through the workflow in parallel.
//!
//! Each symbol gets a fresh orchestrator (and therefore its own session and
//! call-chain scope); a semaphore bounds concurrency to stay under upstream
//! rate limits. Per-symbol failure never aborts the batch. Results are
//! ranked by confidence, descending.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::agents::AnalystKind;
use crate::artifacts::ArtifactHandle;
use crate::cancel::CancelSignal;
use crate::config::{Config, WorkflowMode};
use crate::llm::ChatCompletionApi;
use crate::market_data::MarketDataFetcher;
use crate::workflow::{WorkflowOrchestrator, WorkflowRequest, WorkflowResult};

#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub symbol: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    /// Successful workflow results, sorted by confidence descending.
    pub results: Vec<WorkflowResult>,
    pub errors: Vec<BatchError>,
    pub total_time: f64,
}

impl BatchReport {
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "symbol,recommendation,confidence_score,target_price,acceptable_price_min,\
             acceptable_price_max,take_profit,stop_loss,position_size,time_horizon,reasoning\n",
        );
        for result in &self.results {
            let reasoning = result.reasoning.clone().unwrap_or_default();
            let reasoning = if reasoning.chars().count() > 200 {
                let cut: String = reasoning.chars().take(200).collect();
                format!("{cut}...")
            } else {
                reasoning
            };
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{}\n",
                csv_field(&result.symbol),
                result
                    .recommendation
                    .map(|r| r.as_str().to_string())
                    .unwrap_or_default(),
                format_number(result.confidence_score),
                format_number(result.target_price),
                format_number(result.acceptable_price_min),
                format_number(result.acceptable_price_max),
                format_number(result.take_profit),
                format_number(result.stop_loss),
                format_number(result.position_size),
                csv_field(result.time_horizon.as_deref().unwrap_or_default()),
                csv_field(&reasoning),
            ));
        }
        out
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_csv())
            .with_context(|| format!("writing {}", path.as_ref().display()))
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let body = serde_json::to_string_pretty(&json!({
            "results": self.results,
            "errors": self.errors,
            "total_time": self.total_time,
        }))?;
        std::fs::write(path.as_ref(), body)
            .with_context(|| format!("writing {}", path.as_ref().display()))
    }
}

fn format_number(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

pub struct BatchAnalyzer {
    config: Config,
    api: Arc<dyn ChatCompletionApi>,
    fetcher: Arc<dyn MarketDataFetcher>,
    artifacts: ArtifactHandle,
}

impl BatchAnalyzer {
    pub fn new(
        config: Config,
        api: Arc<dyn ChatCompletionApi>,
        fetcher: Arc<dyn MarketDataFetcher>,
        artifacts: ArtifactHandle,
    ) -> Self {
        BatchAnalyzer {
            config,
            api,
            fetcher,
            artifacts,
        }
    }

    /// Analyze a set of symbols with the given analyst selection and
    /// current portfolio weights.
    #[instrument(skip(self, symbols, analyst_set, positions, cancel), fields(count = symbols.len()))]
    pub async fn analyze_portfolio(
        &self,
        symbols: &[String],
        analyst_set: &[AnalystKind],
        positions: &HashMap<String, f64>,
        mode: WorkflowMode,
        cancel: &CancelSignal,
    ) -> BatchReport {
        let started = Instant::now();
        info!(workers = self.config.batch.max_workers, "batch analysis started");
        let semaphore = Arc::new(Semaphore::new(self.config.batch.max_workers));

        let mut handles = Vec::new();
        for symbol in symbols {
            let symbol = symbol.clone();
            let position = positions.get(&symbol).copied().unwrap_or(0.0);
            let analyst_set = analyst_set.to_vec();
            let config = self.config.clone();
            let api = self.api.clone();
            let fetcher = self.fetcher.clone();
            let artifacts = self.artifacts.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let market_data = match fetcher.fetch(&symbol).await {
                    Ok(data) => data,
                    Err(error) => {
                        return (
                            symbol.clone(),
                            Err(format!("market data fetch failed: {error}")),
                        )
                    }
                };
                // A fresh orchestrator per symbol: own session, own
                // call-chain scope.
                let orchestrator = WorkflowOrchestrator::new(config, api, artifacts);
                let result = orchestrator
                    .run(
                        WorkflowRequest {
                            symbol: symbol.clone(),
                            market_data,
                            analyst_set,
                            mode,
                            current_position_size: position,
                        },
                        &cancel,
                    )
                    .await;
                (symbol, Ok(result))
            }));
        }

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((symbol, Ok(result))) => {
                    if result.success {
                        info!(
                            symbol,
                            recommendation = result
                                .recommendation
                                .map(|r| r.as_str())
                                .unwrap_or("-"),
                            "symbol analyzed"
                        );
                        results.push(result);
                    } else {
                        let error = result.error.clone().unwrap_or_else(|| "unknown".to_string());
                        warn!(symbol, error = %error, "symbol failed");
                        errors.push(BatchError { symbol, error });
                    }
                }
                Ok((symbol, Err(error))) => {
                    warn!(symbol, error = %error, "symbol failed before workflow");
                    errors.push(BatchError { symbol, error });
                }
                Err(join_error) => errors.push(BatchError {
                    symbol: "<unknown>".to_string(),
                    error: format!("worker panicked: {join_error}"),
                }),
            }
        }

        rank_by_confidence(&mut results);
        let total_time = started.elapsed().as_secs_f64();
        info!(
            successes = results.len(),
            failures = errors.len(),
            total_time,
            "batch analysis finished"
        );
        BatchReport {
            results,
            errors,
            total_time,
        }
    }
}

fn rank_by_confidence(results: &mut [WorkflowResult]) {
    results.sort_by(|a, b| {
        let ca = a.confidence_score.unwrap_or(0.0);
        let cb = b.confidence_score.unwrap_or(0.0);
        cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
    });
}
