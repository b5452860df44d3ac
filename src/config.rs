//! Engine configuration.
//!
//! Loaded once at orchestrator construction from defaults, an optional JSON
//! file and one-to-one environment variable overrides (uppercased,
//! underscored: `LLM_API_KEY`, `DEBATE_MODELS`, ...).

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_seconds: u64,
    pub retry_max_attempts: u32,
    pub retry_base_seconds: f64,
    pub retry_cap_seconds: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            api_key: String::new(),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-v3.1-latest".to_string(),
            max_tokens: 32000,
            temperature: 0.0,
            timeout_seconds: 60,
            retry_max_attempts: 5,
            retry_base_seconds: 4.0,
            retry_cap_seconds: 60.0,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    pub research_team_max_rounds: u32,
    pub risk_team_max_rounds: u32,
    pub min_consensus_threshold: f64,
    pub models: Vec<String>,
    pub randomize_models: bool,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            research_team_max_rounds: 3,
            risk_team_max_rounds: 3,
            min_consensus_threshold: 0.6,
            models: Vec::new(),
            randomize_models: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketDataSource {
    Online,
    Cached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub market_data_provider: MarketDataSource,
    pub cache_enabled: bool,
    pub cache_ttl: u64,
    pub data_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            market_data_provider: MarketDataSource::Online,
            cache_enabled: true,
            cache_ttl: 300,
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_workers: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    Quick,
    Full,
}

impl FromStr for WorkflowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quick" => Ok(WorkflowMode::Quick),
            "full" => Ok(WorkflowMode::Full),
            other => Err(format!("unknown workflow mode `{other}`")),
        }
    }
}

impl std::fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowMode::Quick => write!(f, "quick"),
            WorkflowMode::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub mode: WorkflowMode,
    pub max_tool_iterations: usize,
    pub log_root: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            mode: WorkflowMode::Full,
            max_tool_iterations: 10,
            log_root: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub debate: DebateConfig,
    pub data: DataConfig,
    pub batch: BatchConfig,
    pub workflow: WorkflowConfig,
}

impl Config {
    /// Defaults, then environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// JSON file, then environment overrides on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut config: Config = serde_json::from_str(&raw).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("LLM_MAX_TOKENS", &v)?;
        }
        if let Ok(v) = std::env::var("LLM_TEMPERATURE") {
            self.llm.temperature = parse_env("LLM_TEMPERATURE", &v)?;
        }
        if let Ok(v) = std::env::var("LLM_TIMEOUT_SECONDS") {
            self.llm.timeout_seconds = parse_env("LLM_TIMEOUT_SECONDS", &v)?;
        }
        if let Ok(v) = std::env::var("DEBATE_RESEARCH_TEAM_MAX_ROUNDS") {
            self.debate.research_team_max_rounds =
                parse_env("DEBATE_RESEARCH_TEAM_MAX_ROUNDS", &v)?;
        }
        if let Ok(v) = std::env::var("DEBATE_RISK_TEAM_MAX_ROUNDS") {
            self.debate.risk_team_max_rounds = parse_env("DEBATE_RISK_TEAM_MAX_ROUNDS", &v)?;
        }
        if let Ok(v) = std::env::var("DEBATE_MIN_CONSENSUS_THRESHOLD") {
            self.debate.min_consensus_threshold =
                parse_env("DEBATE_MIN_CONSENSUS_THRESHOLD", &v)?;
        }
        if let Ok(v) = std::env::var("DEBATE_MODELS") {
            self.debate.models = v
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("DEBATE_RANDOMIZE_MODELS") {
            self.debate.randomize_models = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Ok(v) = std::env::var("DATA_MARKET_DATA_PROVIDER") {
            self.data.market_data_provider = match v.to_ascii_lowercase().as_str() {
                "online" => MarketDataSource::Online,
                "cached" => MarketDataSource::Cached,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "DATA_MARKET_DATA_PROVIDER".to_string(),
                        message: format!("unknown provider `{other}`"),
                    })
                }
            };
        }
        if let Ok(v) = std::env::var("DATA_CACHE_ENABLED") {
            self.data.cache_enabled = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Ok(v) = std::env::var("DATA_CACHE_TTL") {
            self.data.cache_ttl = parse_env("DATA_CACHE_TTL", &v)?;
        }
        if let Ok(v) = std::env::var("DATA_DIR") {
            self.data.data_dir = v;
        }
        if let Ok(v) = std::env::var("BATCH_MAX_WORKERS") {
            self.batch.max_workers = parse_env("BATCH_MAX_WORKERS", &v)?;
        }
        if let Ok(v) = std::env::var("WORKFLOW_MODE") {
            self.workflow.mode = v.parse().map_err(|message| ConfigError::InvalidValue {
                key: "WORKFLOW_MODE".to_string(),
                message,
            })?;
        }
        if let Ok(v) = std::env::var("WORKFLOW_LOG_ROOT") {
            self.workflow.log_root = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.max_workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.debate.min_consensus_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "debate.min_consensus_threshold".to_string(),
                message: "must lie in [0, 1]".to_string(),
            });
        }
        if self.llm.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "llm.retry_max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.workflow.max_tool_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workflow.max_tool_iterations".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.debate.research_team_max_rounds, 3);
        assert_eq!(config.batch.max_workers, 3);
        assert_eq!(config.workflow.mode, WorkflowMode::Full);
    }

    #[test]
    fn mode_parses_both_ways() {
        assert_eq!("quick".parse::<WorkflowMode>().unwrap(), WorkflowMode::Quick);
        assert_eq!("FULL".parse::<WorkflowMode>().unwrap(), WorkflowMode::Full);
        assert!("fast".parse::<WorkflowMode>().is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = Config::default();
        config.batch.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn consensus_threshold_bounds() {
        let mut config = Config::default();
        config.debate.min_consensus_threshold = 1.2;
        assert!(config.validate().is_err());
    }
}
