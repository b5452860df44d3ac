//! Batch analyzer scenarios.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use common::{default_payloads, test_config, AutoToolApi};
use equity_agents::agents::AnalystKind;
use equity_agents::artifacts::ArtifactHandle;
use equity_agents::batch::BatchAnalyzer;
use equity_agents::cancel::CancelSignal;
use equity_agents::config::WorkflowMode;
use equity_agents::market_data::{MarketData, StaticFetcher};

fn market(price: f64) -> MarketData {
    let mut data = MarketData::new();
    data.insert("current_price", json!(price));
    data
}

#[tokio::test]
async fn batch_tolerates_missing_market_data() {
    let api = Arc::new(AutoToolApi::new(default_payloads()));
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with("AAPL", market(190.0))
            .with("MSFT", market(410.0)),
    );
    let analyzer = BatchAnalyzer::new(test_config(), api, fetcher, ArtifactHandle::disabled());

    let symbols = vec![
        "AAPL".to_string(),
        "MSFT".to_string(),
        "NOPE".to_string(),
    ];
    let report = analyzer
        .analyze_portfolio(
            &symbols,
            &[AnalystKind::Technical],
            &HashMap::new(),
            WorkflowMode::Quick,
            &CancelSignal::never(),
        )
        .await;

    // Every input symbol is accounted for exactly once.
    assert_eq!(report.results.len() + report.errors.len(), symbols.len());
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].symbol, "NOPE");

    // Ranked by confidence, descending.
    let confidences: Vec<f64> = report
        .results
        .iter()
        .map(|r| r.confidence_score.unwrap_or(0.0))
        .collect();
    let mut sorted = confidences.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(confidences, sorted);

    // CSV carries exactly the two successful rows.
    let csv = report.to_csv();
    let rows: Vec<&str> = csv.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert!(row.starts_with("AAPL,") || row.starts_with("MSFT,"));
        assert!(row.contains(",BUY,"));
    }
}

#[tokio::test]
async fn batch_runs_with_bounded_concurrency() {
    let mut config = test_config();
    config.batch.max_workers = 1;
    let api = Arc::new(AutoToolApi::new(default_payloads()));
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with("AAPL", market(190.0))
            .with("MSFT", market(410.0)),
    );
    let analyzer = BatchAnalyzer::new(config, api, fetcher, ArtifactHandle::disabled());

    let report = analyzer
        .analyze_portfolio(
            &["AAPL".to_string(), "MSFT".to_string()],
            &[AnalystKind::Technical],
            &HashMap::new(),
            WorkflowMode::Quick,
            &CancelSignal::never(),
        )
        .await;

    assert_eq!(report.results.len(), 2);
    assert!(report.errors.is_empty());
    assert!(report.total_time >= 0.0);
}

#[tokio::test]
async fn batch_passes_portfolio_positions_through() {
    let mut payloads = default_payloads();
    payloads.insert(
        "emit_trading_decision".to_string(),
        json!({
            "recommendation": "HOLD",
            "confidence_score": 0.6,
            "position_size": 0.0,
            "time_horizon": "medium",
            "reasoning": "keep what we hold",
        }),
    );
    let api = Arc::new(AutoToolApi::new(payloads));
    let fetcher = Arc::new(StaticFetcher::new().with("AAPL", market(190.0)));
    let analyzer = BatchAnalyzer::new(test_config(), api, fetcher, ArtifactHandle::disabled());

    let mut positions = HashMap::new();
    positions.insert("AAPL".to_string(), 0.35);
    let report = analyzer
        .analyze_portfolio(
            &["AAPL".to_string()],
            &[AnalystKind::Technical],
            &positions,
            WorkflowMode::Quick,
            &CancelSignal::never(),
        )
        .await;

    assert_eq!(report.results.len(), 1);
    // HOLD with an existing position keeps the current weight.
    assert_eq!(report.results[0].position_size, Some(0.35));
}
