//! Market data carried into an analysis.
//!
//! The engine never fetches market data itself; callers hand in a
//! [`MarketData`] mapping, typically through a [`MarketDataFetcher`]
//! implementation. The mapping is opaque apart from two conventions: an
//! `error` field marks the data as unusable, and `current_position_size`
//! carries the caller's existing portfolio weight for the symbol.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub const CURRENT_POSITION_KEY: &str = "current_position_size";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketData {
    fields: Map<String, Value>,
}

impl MarketData {
    pub fn new() -> Self {
        MarketData::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        MarketData { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn has_error(&self) -> bool {
        self.fields.contains_key("error")
    }

    pub fn error_message(&self) -> Option<String> {
        self.fields.get("error").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn current_position_size(&self) -> f64 {
        self.fields
            .get(CURRENT_POSITION_KEY)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }

    pub fn set_current_position_size(&mut self, size: f64) {
        self.insert(CURRENT_POSITION_KEY, Value::from(size.clamp(0.0, 1.0)));
    }

    /// A nested object under `key`, if present and an object.
    pub fn sub_mapping(&self, key: &str) -> Option<Map<String, Value>> {
        match self.fields.get(key) {
            Some(Value::Object(map)) => Some(map.clone()),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

#[async_trait]
pub trait MarketDataFetcher: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<MarketData>;
}

/// TTL cache in front of any fetcher, honoring `data.cache_enabled` and
/// `data.cache_ttl`.
pub struct CachedFetcher<F> {
    inner: F,
    enabled: bool,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, MarketData)>>,
}

impl<F: MarketDataFetcher> CachedFetcher<F> {
    pub fn new(inner: F, enabled: bool, ttl: Duration) -> Self {
        CachedFetcher {
            inner,
            enabled,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<F: MarketDataFetcher> MarketDataFetcher for CachedFetcher<F> {
    async fn fetch(&self, symbol: &str) -> Result<MarketData> {
        if self.enabled {
            let cache = self.cache.lock().expect("cache lock poisoned");
            if let Some((stored_at, data)) = cache.get(symbol) {
                if stored_at.elapsed() <= self.ttl {
                    debug!(symbol, "market data cache hit");
                    return Ok(data.clone());
                }
            }
        }
        let data = self.inner.fetch(symbol).await?;
        if self.enabled {
            let mut cache = self.cache.lock().expect("cache lock poisoned");
            cache.insert(symbol.to_string(), (Instant::now(), data.clone()));
        }
        Ok(data)
    }
}

/// Fixed per-symbol data. Backs tests and file-based runs; a symbol without
/// an entry resolves to an error mapping, which downstream treats as
/// invalid data.
#[derive(Default)]
pub struct StaticFetcher {
    data: HashMap<String, MarketData>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        StaticFetcher::default()
    }

    pub fn with(mut self, symbol: &str, data: MarketData) -> Self {
        self.data.insert(symbol.to_uppercase(), data);
        self
    }

    /// Load `<SYMBOL>.json` files from a directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut fetcher = StaticFetcher::new();
        if !dir.exists() {
            return Ok(fetcher);
        }
        for entry in std::fs::read_dir(dir).context("reading market data dir")? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let fields: Map<String, Value> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            fetcher
                .data
                .insert(stem.to_uppercase(), MarketData::from_map(fields));
        }
        Ok(fetcher)
    }
}

#[async_trait]
impl MarketDataFetcher for StaticFetcher {
    async fn fetch(&self, symbol: &str) -> Result<MarketData> {
        Ok(self
            .data
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_else(|| {
                let mut data = MarketData::new();
                data.insert("error", Value::String(format!("no market data for {symbol}")));
                data
            }))
    }
}
