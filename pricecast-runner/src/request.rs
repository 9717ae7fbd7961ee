//! Invocation payload.

use serde::{Deserialize, Serialize};

/// What to forecast. Missing fields take the production defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastRequest {
    /// Empty means the configured default ticker.
    pub tickers: Vec<String>,
    pub short_horizon_hours: usize,
    pub long_horizon_days: usize,
    /// Label written to forecast rows.
    pub model: String,
}

impl Default for ForecastRequest {
    fn default() -> Self {
        Self {
            tickers: Vec::new(),
            short_horizon_hours: 24,
            long_horizon_days: 90,
            model: "sarimax".into(),
        }
    }
}

impl ForecastRequest {
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
    }

    /// Tickers to run, falling back to `default_ticker`. Blank entries are
    /// dropped and duplicates keep their first position.
    pub fn resolved_tickers(&self, default_ticker: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.tickers.len());
        for ticker in &self.tickers {
            let ticker = ticker.trim();
            if !ticker.is_empty() && !out.iter().any(|t| t == ticker) {
                out.push(ticker.to_string());
            }
        }
        if out.is_empty() {
            out.push(default_ticker.to_string());
        }
        out
    }
}
