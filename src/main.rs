//! CLI entry point.
//!
//! Reads configuration from the environment (and an optional JSON file via
//! `CONFIG_FILE`), analyzes the symbols given on the command line and
//! prints a one-line summary per symbol. Market data is loaded from
//! `<data_dir>/<SYMBOL>.json` files.
//!
//! Exit codes: 0 workflow success (partial analyst failures included),
//! 1 workflow failure or missing credentials, 2 invalid configuration.

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use equity_agents::agents::AnalystKind;
use equity_agents::artifacts::ArtifactLogger;
use equity_agents::batch::BatchAnalyzer;
use equity_agents::cancel::CancelSignal;
use equity_agents::config::Config;
use equity_agents::llm::OpenAiCompatClient;
use equity_agents::market_data::StaticFetcher;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!("invalid configuration: {err}");
            return ExitCode::from(2);
        }
    };
    if config.llm.api_key.is_empty() {
        eprintln!("missing credentials: set LLM_API_KEY");
        return ExitCode::from(1);
    }

    let symbols: Vec<String> = std::env::args()
        .skip(1)
        .filter(|arg| !arg.starts_with('-'))
        .map(|s| s.to_uppercase())
        .collect();
    if symbols.is_empty() {
        eprintln!("usage: equity-agents SYMBOL [SYMBOL ...]");
        return ExitCode::from(2);
    }

    let fetcher = match StaticFetcher::from_dir(&config.data.data_dir) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(err) => {
            eprintln!("failed to load market data: {err}");
            return ExitCode::from(1);
        }
    };

    let api = Arc::new(OpenAiCompatClient::new(
        config.llm.provider.clone(),
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
    ));
    let (artifacts, _writer) = ArtifactLogger::spawn(config.workflow.log_root.clone());

    info!(count = symbols.len(), mode = %config.workflow.mode, "starting analysis");
    let analyzer = BatchAnalyzer::new(config.clone(), api, fetcher, artifacts);
    let report = analyzer
        .analyze_portfolio(
            &symbols,
            &AnalystKind::ALL,
            &HashMap::new(),
            config.workflow.mode,
            &CancelSignal::never(),
        )
        .await;

    for result in &report.results {
        println!(
            "{}: {} (confidence {:.2}, target weight {:.2})",
            result.symbol,
            result
                .recommendation
                .map(|r| r.as_str())
                .unwrap_or("-"),
            result.confidence_score.unwrap_or(0.0),
            result.position_size.unwrap_or(0.0),
        );
    }
    for failure in &report.errors {
        println!("{}: failed - {}", failure.symbol, failure.error);
    }

    if let Ok(path) = std::env::var("BATCH_OUTPUT_CSV") {
        if let Err(err) = report.write_csv(&path) {
            error!(error = %err, "csv output failed");
        } else {
            println!("results written to {path}");
        }
    }
    if let Ok(path) = std::env::var("BATCH_OUTPUT_JSON") {
        if let Err(err) = report.write_json(&path) {
            error!(error = %err, "json output failed");
        }
    }

    if report.results.is_empty() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn load_config() -> Result<Config, equity_agents::error::ConfigError> {
    match std::env::var("CONFIG_FILE") {
        Ok(path) => Config::from_file(path),
        Err(_) => Config::from_env(),
    }
}
