//! Watchlist scanner.
//!
//! Evaluates a list of tickers independently. A failing ticker yields an
//! error entry and never aborts the scan.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::data::{HistoryService, Lookback, TickerValuation};
use crate::portfolio::normalize_ticker;
use crate::valuation::ValuationCategory;

/// Default number of tickers evaluated at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Outcome for one ticker of the watchlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEntry {
    pub ticker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valuation: Option<TickerValuation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanEntry {
    pub fn category(&self) -> Option<ValuationCategory> {
        self.valuation.as_ref().map(|v| v.result.category)
    }
}

/// Result of a watchlist scan, one entry per input ticker in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub entries: Vec<ScanEntry>,
}

impl ScanReport {
    /// Entries in a buy zone (opportunity or cheap).
    pub fn opportunities(&self) -> Vec<&ScanEntry> {
        self.entries
            .iter()
            .filter(|e| e.category().is_some_and(|c| c.is_buy_zone()))
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.error.is_some()).count()
    }
}

/// Scans watchlists with bounded concurrency.
pub struct WatchlistScanner {
    history: Arc<HistoryService>,
    max_concurrency: usize,
    lookback: Option<Lookback>,
}

impl WatchlistScanner {
    pub fn new(history: Arc<HistoryService>) -> Self {
        Self {
            history,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            lookback: None,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_lookback(mut self, lookback: Lookback) -> Self {
        self.lookback = Some(lookback);
        self
    }

    /// Evaluate every ticker.
    pub async fn scan(&self, tickers: &[String]) -> ScanReport {
        let entries: Vec<ScanEntry> = stream::iter(tickers.to_vec())
            .map(|raw| self.scan_one(raw))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let report = ScanReport { entries };
        info!(
            tickers = tickers.len(),
            opportunities = report.opportunities().len(),
            failures = report.failures(),
            "Watchlist scan complete"
        );
        report
    }

    async fn scan_one(&self, raw: String) -> ScanEntry {
        let ticker = match normalize_ticker(&raw) {
            Ok(ticker) => ticker,
            Err(e) => {
                return ScanEntry {
                    ticker: raw,
                    valuation: None,
                    error: Some(e.to_string()),
                }
            }
        };

        match self.history.evaluate(&ticker, self.lookback).await {
            Ok(valuation) => ScanEntry {
                ticker,
                valuation: Some(valuation),
                error: None,
            },
            Err(e) => ScanEntry {
                ticker,
                valuation: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HistoryCache, MarketDataProvider, ProviderError};
    use crate::valuation::{DividendSeries, PriceSeries};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    /// Falling series for "DROP3", rising for anything else, error for "FAIL3".
    struct TrendProvider;

    #[async_trait]
    impl MarketDataProvider for TrendProvider {
        fn name(&self) -> &'static str {
            "trend"
        }

        async fn get_price_history(
            &self,
            ticker: &str,
            _lookback: Lookback,
        ) -> Result<PriceSeries, ProviderError> {
            let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
            let closes: Vec<f64> = match ticker {
                "FAIL3" => return Err(ProviderError::Network("boom".into())),
                "DROP3" => (0..300).map(|i| 300.0 - i as f64).collect(),
                _ => (0..300).map(|i| 1.0 + i as f64).collect(),
            };
            Ok(PriceSeries::from_closes(start, &closes))
        }

        async fn get_dividend_history(&self, _ticker: &str) -> Result<DividendSeries, ProviderError> {
            Ok(DividendSeries::empty())
        }
    }

    fn assert_send<T: Send>(value: T) -> T {
        value
    }

    #[tokio::test]
    async fn test_scan_future_is_send() {
        let history = Arc::new(HistoryService::new(
            Arc::new(TrendProvider),
            Arc::new(HistoryCache::new()),
        ));
        let scanner = WatchlistScanner::new(history);
        let tickers = vec!["RISE3".to_string()];

        let report = assert_send(scanner.scan(&tickers)).await;
        assert_eq!(report.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_scan_keeps_order_and_isolates_failures() {
        let history = Arc::new(HistoryService::new(
            Arc::new(TrendProvider),
            Arc::new(HistoryCache::new()),
        ));
        let scanner = WatchlistScanner::new(history).with_max_concurrency(2);

        let tickers: Vec<String> = ["drop3", "FAIL3", "RISE3", "!"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        let report = scanner.scan(&tickers).await;

        assert_eq!(report.entries.len(), 4);
        assert_eq!(report.entries[0].ticker, "DROP3");
        assert!(report.entries[1].error.is_some());
        assert_eq!(report.entries[2].category(), Some(ValuationCategory::Expensive));
        assert!(report.entries[3].error.is_some());
        assert_eq!(report.failures(), 2);

        let opportunities = report.opportunities();
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].ticker, "DROP3");
    }
}
