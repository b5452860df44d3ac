//! The four analyst agents: fundamental, technical, sentiment and news.
//!
//! They share one shape and differ in role, system prompt, tool set and the
//! prompt built over the market data. Each publishes an
//! [`AnalysisReport`] into its session slot and returns it.

use std::str::FromStr;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{AgentCore, AgentRuntime};
use crate::artifacts::pretty;
use crate::cancel::CancelSignal;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::market_data::MarketData;
use crate::session::{AgentRole, AnalysisReport, Recommendation};
use crate::tools::{emitters, news, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalystKind {
    Fundamental,
    Technical,
    Sentiment,
    News,
}

impl AnalystKind {
    pub const ALL: [AnalystKind; 4] = [
        AnalystKind::Fundamental,
        AnalystKind::Technical,
        AnalystKind::Sentiment,
        AnalystKind::News,
    ];

    pub fn key(self) -> &'static str {
        match self {
            AnalystKind::Fundamental => "fundamental",
            AnalystKind::Technical => "technical",
            AnalystKind::Sentiment => "sentiment",
            AnalystKind::News => "news",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "fundamental" => Some(AnalystKind::Fundamental),
            "technical" => Some(AnalystKind::Technical),
            "sentiment" => Some(AnalystKind::Sentiment),
            "news" => Some(AnalystKind::News),
            _ => None,
        }
    }

    pub fn role(self) -> AgentRole {
        match self {
            AnalystKind::Fundamental => AgentRole::FundamentalAnalyst,
            AnalystKind::Technical => AgentRole::TechnicalAnalyst,
            AnalystKind::Sentiment => AgentRole::SentimentAnalyst,
            AnalystKind::News => AgentRole::NewsAnalyst,
        }
    }

    pub fn terminal_tool(self) -> &'static str {
        match self {
            AnalystKind::Fundamental => "emit_fundamental_analysis",
            AnalystKind::Technical => "emit_technical_analysis",
            AnalystKind::Sentiment => "emit_sentiment_analysis",
            AnalystKind::News => "emit_news_analysis",
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            AnalystKind::Fundamental => {
                "You are a professional fundamental analyst. You evaluate valuation, \
                 financial health and growth prospects from company and market data, \
                 and you ground every claim in the numbers you were given. Conclude by \
                 committing your structured result through the emit_fundamental_analysis tool."
            }
            AnalystKind::Technical => {
                "You are a professional technical analyst. You read price action, \
                 trend, momentum, volume and key support/resistance levels from the \
                 supplied market data. Conclude by committing your structured result \
                 through the emit_technical_analysis tool."
            }
            AnalystKind::Sentiment => {
                "You are a professional market sentiment analyst. You interpret \
                 social-media activity, sentiment indicators and crowd positioning, \
                 and you watch for contrarian signals. Conclude by committing your \
                 structured result through the emit_sentiment_analysis tool."
            }
            AnalystKind::News => {
                "You are a professional news analyst. You assess how recent headlines \
                 and events are likely to move the stock. Use the news tools to gather \
                 recent coverage before judging. Conclude by committing your structured \
                 result through the emit_news_analysis tool."
            }
        }
    }
}

pub struct Analyst {
    core: AgentCore,
    kind: AnalystKind,
}

impl Analyst {
    pub fn new(
        kind: AnalystKind,
        llm: LlmClient,
        http: reqwest::Client,
        runtime: &AgentRuntime,
    ) -> Self {
        let mut tools = Vec::new();
        match kind {
            AnalystKind::Fundamental => tools.push(emitters::emit_fundamental_analysis()),
            AnalystKind::Technical => tools.push(emitters::emit_technical_analysis()),
            AnalystKind::Sentiment => tools.push(emitters::emit_sentiment_analysis()),
            AnalystKind::News => {
                tools.push(emitters::emit_news_analysis());
                tools.push(news::fetch_stock_news(http.clone()));
                tools.push(news::search_google_news(http));
            }
        }
        let core = AgentCore::new(
            kind.role(),
            kind.system_prompt(),
            llm,
            ToolRegistry::new(tools),
            kind.terminal_tool(),
            runtime,
        );
        Analyst { core, kind }
    }

    pub fn kind(&self) -> AnalystKind {
        self.kind
    }

    #[instrument(skip(self, market, cancel), fields(analyst = self.kind.key()))]
    pub async fn process(
        &self,
        symbol: &str,
        market: &MarketData,
        cancel: &CancelSignal,
    ) -> Result<AnalysisReport, AgentError> {
        if market.has_error() {
            let message = market
                .error_message()
                .unwrap_or_else(|| "market data missing".to_string());
            return Err(AgentError::DataInvalid(message));
        }

        self.core.reset_recorder();
        self.core.ensure_session(symbol);
        debug!(symbol, "analysis started");
        let started = Instant::now();

        let prompt = self.build_prompt(symbol, market);
        match self.core.run_until_tool(&prompt, cancel).await {
            Ok(payload) => {
                let report = self.wrap_report(symbol, payload.clone(), started.elapsed().as_secs_f64());
                self.core.session().add_analysis_report(report.clone());
                self.core.emit_chain(symbol, payload, true);
                self.core.log_output(
                    symbol,
                    "analysis",
                    format!(
                        "**Recommendation**: {} (confidence {:.2})\n\n{}",
                        report.recommendation,
                        report.confidence_score,
                        report.detailed_analysis
                    ),
                );
                Ok(report)
            }
            Err(error) => {
                self.core.emit_chain(
                    symbol,
                    serde_json::json!({"error": error.to_string()}),
                    false,
                );
                Err(error)
            }
        }
    }

    fn build_prompt(&self, symbol: &str, market: &MarketData) -> String {
        let data = pretty(&market.to_value());
        let focus = match self.kind {
            AnalystKind::Fundamental => {
                "Focus on:\n\
                 1. Valuation: fair-value range, P/E and P/B in context\n\
                 2. Financial health: balance sheet, debt, profitability\n\
                 3. Growth prospects: revenue outlook, market position, moat\n\
                 4. Risk factors and upcoming catalysts"
            }
            AnalystKind::Technical => {
                "Focus on:\n\
                 1. Trend direction and strength\n\
                 2. Key support and resistance levels\n\
                 3. Momentum, volume and volatility signals\n\
                 4. Technical risk factors across time frames"
            }
            AnalystKind::Sentiment => {
                "Focus on:\n\
                 1. Social media activity and its direction\n\
                 2. Sentiment indicators (VIX, put/call ratio, fear & greed)\n\
                 3. Possible sentiment turning points\n\
                 4. Contrarian signals worth flagging"
            }
            AnalystKind::News => {
                "Focus on:\n\
                 1. Recent headlines and events affecting the company\n\
                 2. The direction and magnitude of their likely impact\n\
                 3. Catalyst events on the horizon\n\
                 4. News-driven risk factors"
            }
        };
        format!(
            "Analyze the stock {symbol} from your specialty's perspective.\n\n\
             Market data:\n{data}\n\n{focus}\n\n\
             When your analysis is complete, call the {tool} tool with your final \
             structured result.",
            tool = self.kind.terminal_tool()
        )
    }

    fn wrap_report(&self, symbol: &str, payload: Value, processing_time: f64) -> AnalysisReport {
        let recommendation = payload["recommendation"]
            .as_str()
            .and_then(|s| Recommendation::from_str(s).ok())
            .unwrap_or(Recommendation::Hold);
        let time_horizon = payload["time_horizon"]
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let text = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                        (k.clone(), text)
                    })
                    .collect()
            })
            .unwrap_or_default();
        AnalysisReport {
            analyst_role: self.kind.role(),
            symbol: symbol.to_string(),
            analysis_date: Utc::now().date_naive(),
            key_findings: string_list(&payload["key_findings"]),
            recommendation,
            confidence_score: payload["confidence_score"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
            risk_factors: string_list(&payload["risk_factors"]),
            time_horizon,
            impact_magnitude: payload["impact_magnitude"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
            supporting_data: payload.clone(),
            detailed_analysis: payload["supporting_evidence"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            processing_time,
        }
    }
}

pub(crate) fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect(),
        _ => Vec::new(),
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
    use serde_json::json;
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
    async fn technical_analyst_publishes_report() {
        let api = ScriptedApi::new(vec![ScriptedApi::tool_call(
            "emit_technical_analysis",
            r#"{"recommendation": "BUY", "confidence_score": 0.7,
                "key_findings": ["uptrend"], "trend_direction": "up",
                "supporting_evidence": "price above both moving averages"}"#,
        )]);
        let runtime = runtime();
        let analyst = Analyst::new(
            AnalystKind::Technical,
            llm(api),
            reqwest::Client::new(),
            &runtime,
        );
        let mut market = MarketData::new();
        market.insert("current_price", json!(190.0));
        let report = analyst
            .process("AAPL", &market, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(report.recommendation, Recommendation::Buy);
        assert!((report.confidence_score - 0.7).abs() < 1e-9);
        assert_eq!(report.analyst_role, AgentRole::TechnicalAnalyst);
        let stored = runtime.session.analysis_reports();
        assert!(stored.contains_key("technical"));
    }

    #[tokio::test]
    async fn market_data_error_fails_before_any_llm_call() {
        let api = ScriptedApi::new(vec![ScriptedApi::text("should never run")]);
        let runtime = runtime();
        let analyst = Analyst::new(
            AnalystKind::Fundamental,
            llm(api),
            reqwest::Client::new(),
            &runtime,
        );
        let mut market = MarketData::new();
        market.insert("error", json!("not found"));
        let err = analyst
            .process("NOPE", &market, &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::DataInvalid(_)));
    }

    #[test]
    fn kind_keys_round_trip() {
        for kind in AnalystKind::ALL {
            assert_eq!(AnalystKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(AnalystKind::from_key("quant"), None);
    }
}
