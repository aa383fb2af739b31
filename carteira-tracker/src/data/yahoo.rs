//! Yahoo Finance chart API adapter.
//!
//! Uses the public v8 chart endpoint, which returns daily closes and the
//! dividend events of a symbol in one response:
//!
//! ```text
//! GET {base}/v8/finance/chart/{symbol}?range=5y&interval=1d&events=div
//! ```
//!
//! B3 tickers (ending in a digit, e.g. `PETR4`, `HGLG11`) are mapped to
//! the exchange suffix (`PETR4.SA`).

use async_trait::async_trait;
use carteira_common::config::MarketDataConfig;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::provider::{Lookback, MarketDataProvider, ProviderError};
use crate::valuation::{DividendEvent, DividendSeries, PricePoint, PriceSeries};

// ============================================================================
// Constants
// ============================================================================

/// Public chart API host
pub const YAHOO_API_BASE: &str = "https://query1.finance.yahoo.com";

/// Chart endpoint
const CHART_ENDPOINT: &str = "/v8/finance/chart";

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Retry hint after a 429
const RATE_LIMIT_RETRY_SECS: u64 = 5;

/// The endpoint rejects requests without a browser-like agent
const USER_AGENT: &str = "Mozilla/5.0 (compatible; carteira-tracker)";

// ============================================================================
// Symbol Mapping
// ============================================================================

/// Map a ticker to the symbol the chart API expects.
///
/// Tickers ending in a digit get `suffix` appended; tickers that already
/// carry a suffix and index symbols (`^BVSP`) are left alone.
pub fn to_yahoo_symbol(ticker: &str, suffix: &str) -> String {
    let ticker = ticker.trim().to_uppercase();
    let ends_with_digit = ticker.chars().last().is_some_and(|c| c.is_ascii_digit());

    if ends_with_digit && !ticker.contains('.') && !ticker.starts_with('^') {
        format!("{}{}", ticker, suffix)
    } else {
        ticker
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Option<ChartIndicators>,
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, ChartDividend>,
}

#[derive(Debug, Deserialize)]
struct ChartDividend {
    amount: f64,
    date: i64,
}

fn timestamp_to_date(ts: i64) -> Result<NaiveDate, ProviderError> {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| ProviderError::Parse(format!("Invalid timestamp: {}", ts)))
}

impl ChartResult {
    /// Closes aligned with timestamps; null closes are skipped.
    fn prices(&self) -> Result<PriceSeries, ProviderError> {
        let closes = self
            .indicators
            .as_ref()
            .and_then(|i| i.quote.first())
            .map(|q| q.close.as_slice())
            .unwrap_or_default();

        let mut points = Vec::with_capacity(closes.len());
        for (ts, close) in self.timestamp.iter().zip(closes) {
            let Some(close) = close else { continue };
            points.push(PricePoint::new(timestamp_to_date(*ts)?, *close));
        }

        Ok(PriceSeries::new(points))
    }

    fn dividends(&self) -> Result<DividendSeries, ProviderError> {
        let Some(events) = &self.events else {
            return Ok(DividendSeries::empty());
        };

        let events = events
            .dividends
            .values()
            .map(|d| Ok(DividendEvent::new(timestamp_to_date(d.date)?, d.amount)))
            .collect::<Result<Vec<_>, ProviderError>>()?;

        Ok(DividendSeries::new(events))
    }
}

// ============================================================================
// Yahoo Adapter
// ============================================================================

/// Yahoo Finance adapter.
pub struct YahooFinanceProvider {
    client: reqwest::Client,
    base_url: String,
    exchange_suffix: String,
}

impl YahooFinanceProvider {
    /// Create with the public endpoint and the B3 suffix.
    pub fn new() -> Self {
        Self::with_base_url(YAHOO_API_BASE, ".SA", DEFAULT_TIMEOUT_SECS)
    }

    /// Create against a custom host (mirrors, tests).
    pub fn with_base_url(base_url: impl Into<String>, exchange_suffix: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            exchange_suffix: exchange_suffix.to_string(),
        }
    }

    /// Create from the market data section of the configuration.
    pub fn from_config(config: &MarketDataConfig) -> Self {
        Self::with_base_url(
            config.base_url.as_str(),
            &config.exchange_suffix,
            config.timeout_secs,
        )
    }

    /// Fetch and decode one chart response.
    async fn fetch_chart(
        &self,
        ticker: &str,
        range: &str,
        interval: &str,
    ) -> Result<ChartResult, ProviderError> {
        let symbol = to_yahoo_symbol(ticker, &self.exchange_suffix);
        let url = format!("{}{}/{}", self.base_url, CHART_ENDPOINT, symbol);

        debug!(url = %url, symbol = %symbol, range, "Fetching chart from Yahoo");

        let response = self
            .client
            .get(&url)
            .query(&[("range", range), ("interval", interval), ("events", "div")])
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network("Request timeout".into())
                } else if e.is_connect() {
                    ProviderError::Network("Connection failed".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::DataNotAvailable(format!(
                "No data found for {}",
                symbol
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Network(format!("HTTP {}: {}", status, body)));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse response: {}", e)))?;

        if let Some(err) = body.chart.error {
            let msg = err
                .description
                .or(err.code)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(ProviderError::DataNotAvailable(format!("{}: {}", symbol, msg)));
        }

        body.chart
            .result
            .and_then(|mut r| r.pop())
            .ok_or_else(|| ProviderError::Parse("missing chart result".into()))
    }
}

impl Default for YahooFinanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn get_price_history(
        &self,
        ticker: &str,
        lookback: Lookback,
    ) -> Result<PriceSeries, ProviderError> {
        let result = self.fetch_chart(ticker, lookback.as_str(), "1d").await?;
        let prices = result.prices()?;

        debug!(ticker, lookback = %lookback, points = prices.len(), "Parsed price history");
        Ok(prices)
    }

    async fn get_dividend_history(&self, ticker: &str) -> Result<DividendSeries, ProviderError> {
        // Events cover the whole range whatever the interval; monthly bars keep the payload small
        let result = self.fetch_chart(ticker, Lookback::Max.as_str(), "1mo").await?;
        let dividends = result.dividends()?;

        debug!(ticker, events = dividends.len(), "Parsed dividend history");
        Ok(dividends)
    }
}

// ============================================================================
// Tests
// ============================================================================
