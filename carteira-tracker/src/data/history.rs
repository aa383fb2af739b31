//! History service: provider access through the cache.
//!
//! Owns the fetch/cache side of a valuation so the scorer stays pure.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::HistoryCache;
use super::provider::{Lookback, MarketDataProvider, ProviderError};
use crate::portfolio::{risk_metrics, RiskMetrics};
use crate::valuation::{
    BazinOutcome, DividendSeries, MetricsOutcome, PriceSeries, ValuationResult, ValuationScorer,
};

/// Concurrent requests issued by `latest_prices`
const DEFAULT_PRICE_CONCURRENCY: usize = 8;

/// Valuation of one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerValuation {
    pub ticker: String,
    pub lookback: Lookback,
    pub metrics: MetricsOutcome,
    pub result: ValuationResult,
}

/// Market history access with caching and scoring.
pub struct HistoryService {
    provider: Arc<dyn MarketDataProvider>,
    cache: Arc<HistoryCache>,
    scorer: ValuationScorer,
    default_lookback: Lookback,
    concurrency: usize,
}

impl HistoryService {
    pub fn new(provider: Arc<dyn MarketDataProvider>, cache: Arc<HistoryCache>) -> Self {
        Self {
            provider,
            cache,
            scorer: ValuationScorer::new(),
            default_lookback: Lookback::default(),
            concurrency: DEFAULT_PRICE_CONCURRENCY,
        }
    }

    pub fn with_scorer(mut self, scorer: ValuationScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_default_lookback(mut self, lookback: Lookback) -> Self {
        self.default_lookback = lookback;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn scorer(&self) -> &ValuationScorer {
        &self.scorer
    }

    pub fn cache(&self) -> &HistoryCache {
        &self.cache
    }

    pub fn default_lookback(&self) -> Lookback {
        self.default_lookback
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Price history over `lookback`.
    ///
    /// When the window is empty the whole available history is tried
    /// instead, so recently listed tickers still get a series.
    pub async fn price_history(
        &self,
        ticker: &str,
        lookback: Lookback,
    ) -> Result<PriceSeries, ProviderError> {
        if let Some(cached) = self.cache.get_prices(ticker, lookback) {
            debug!(ticker, lookback = %lookback, "Price history cache hit");
            return Ok(cached);
        }

        let mut prices = self.provider.get_price_history(ticker, lookback).await?;
        if prices.is_empty() && lookback != Lookback::Max {
            debug!(ticker, lookback = %lookback, "Empty window, falling back to max history");
            prices = self.provider.get_price_history(ticker, Lookback::Max).await?;
        }

        self.cache.set_prices(ticker, lookback, prices.clone());
        Ok(prices)
    }

    /// Dividend history.
    pub async fn dividend_history(&self, ticker: &str) -> Result<DividendSeries, ProviderError> {
        if let Some(cached) = self.cache.get_dividends(ticker) {
            return Ok(cached);
        }

        let dividends = self.provider.get_dividend_history(ticker).await?;
        self.cache.set_dividends(ticker, dividends.clone());
        Ok(dividends)
    }

    /// Dividends, treating a failed fetch as "no dividends".
    async fn dividends_or_empty(&self, ticker: &str) -> DividendSeries {
        match self.dividend_history(ticker).await {
            Ok(dividends) => dividends,
            Err(e) => {
                warn!(ticker, error = %e, "Dividend history unavailable");
                DividendSeries::empty()
            }
        }
    }

    /// Fetch history, compute metrics and score.
    pub async fn evaluate(
        &self,
        ticker: &str,
        lookback: Option<Lookback>,
    ) -> Result<TickerValuation, ProviderError> {
        let lookback = lookback.unwrap_or(self.default_lookback);
        let prices = self.price_history(ticker, lookback).await?;
        let dividends = self.dividends_or_empty(ticker).await;

        let (metrics, result) = self.scorer.evaluate(&prices, &dividends);

        debug!(
            ticker,
            category = %result.category,
            score = result.score,
            "Evaluated ticker"
        );

        Ok(TickerValuation {
            ticker: ticker.to_string(),
            lookback,
            metrics,
            result,
        })
    }

    /// Bazin ceiling price at the latest close.
    ///
    /// A ticker without price history yields [`BazinOutcome::NoPriceData`].
    pub async fn ceiling(
        &self,
        ticker: &str,
        desired_yield: Option<f64>,
    ) -> Result<BazinOutcome, ProviderError> {
        let desired_yield = desired_yield.unwrap_or(self.scorer.default_desired_yield());
        let dividends = self.dividend_history(ticker).await?;
        let current_price = self.latest_price(ticker).await?;
        if current_price.is_none() {
            debug!(ticker, "No price history for the ceiling");
        }

        // A missing price is non-finite, which the scorer reports as NoPriceData
        Ok(self.scorer.bazin_ceiling_price(
            &dividends,
            current_price.unwrap_or(f64::NAN),
            desired_yield,
        ))
    }

    /// Risk metrics over the last year.
    pub async fn risk(&self, ticker: &str) -> Result<Option<RiskMetrics>, ProviderError> {
        let prices = self.price_history(ticker, Lookback::OneYear).await?;
        Ok(risk_metrics(&prices))
    }

    /// Latest close, `None` when the ticker has no history.
    pub async fn latest_price(&self, ticker: &str) -> Result<Option<f64>, ProviderError> {
        let prices = self.price_history(ticker, Lookback::FiveDays).await?;
        Ok(prices.last_close())
    }

    /// Latest close of every ticker that has one. Failures are logged and skipped.
    pub async fn latest_prices(&self, tickers: &[String]) -> HashMap<String, f64> {
        stream::iter(tickers.to_vec())
            .map(|ticker| async move {
                let result = self.latest_price(&ticker).await;
                (ticker, result)
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|(ticker, result)| async move {
                match result {
                    Ok(Some(price)) => Some((ticker, price)),
                    Ok(None) => None,
                    Err(e) => {
                        warn!(ticker = %ticker, error = %e, "Price unavailable");
                        None
                    }
                }
            })
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed series for `Max` only and counts calls.
    struct MaxOnlyProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for MaxOnlyProvider {
        fn name(&self) -> &'static str {
            "max-only"
        }

        async fn get_price_history(
            &self,
            _ticker: &str,
            lookback: Lookback,
        ) -> Result<PriceSeries, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if lookback == Lookback::Max {
                let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
                Ok(PriceSeries::from_closes(start, &[10.0, 12.0]))
            } else {
                Ok(PriceSeries::default())
            }
        }

        async fn get_dividend_history(&self, _ticker: &str) -> Result<DividendSeries, ProviderError> {
            Err(ProviderError::Network("down".into()))
        }
    }

    /// Pays dividends but has no price history.
    struct DividendOnlyProvider;

    #[async_trait]
    impl MarketDataProvider for DividendOnlyProvider {
        fn name(&self) -> &'static str {
            "dividends-only"
        }

        async fn get_price_history(
            &self,
            _ticker: &str,
            _lookback: Lookback,
        ) -> Result<PriceSeries, ProviderError> {
            Ok(PriceSeries::default())
        }

        async fn get_dividend_history(&self, _ticker: &str) -> Result<DividendSeries, ProviderError> {
            let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            Ok(DividendSeries::new(
                start
                    .iter_days()
                    .step_by(30)
                    .take(12)
                    .map(|date| crate::valuation::DividendEvent::new(date, 0.5))
                    .collect(),
            ))
        }
    }

    fn service() -> (HistoryService, Arc<MaxOnlyProvider>) {
        let provider = Arc::new(MaxOnlyProvider {
            calls: AtomicUsize::new(0),
        });
        let service = HistoryService::new(provider.clone(), Arc::new(HistoryCache::new()));
        (service, provider)
    }

    #[tokio::test]
    async fn test_falls_back_to_max_and_caches() {
        let (service, provider) = service();

        let prices = service.price_history("NEWC3", Lookback::FiveYears).await.unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let again = service.price_history("NEWC3", Lookback::FiveYears).await.unwrap();
        assert_eq!(again, prices);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_evaluate_tolerates_dividend_failure() {
        let (service, _) = service();
        let valuation = service.evaluate("NEWC3", None).await.unwrap();
        assert_eq!(valuation.lookback, Lookback::FiveYears);
        assert!(valuation.metrics.is_available());
        assert_eq!(valuation.result.dividend_yield_pct, None);
    }

    fn assert_send<T: Send>(value: T) -> T {
        value
    }

    #[tokio::test]
    async fn test_ceiling_without_prices() {
        let service = HistoryService::new(
            Arc::new(DividendOnlyProvider),
            Arc::new(HistoryCache::new()),
        );
        let outcome = service.ceiling("TESOURO11", None).await.unwrap();
        assert_eq!(outcome, BazinOutcome::NoPriceData);
    }

    #[tokio::test]
    async fn test_latest_prices_future_is_send() {
        let (service, _) = service();
        let tickers = vec!["AAAA3".to_string()];
        let prices = assert_send(service.latest_prices(&tickers)).await;
        assert_eq!(prices.len(), 1);
    }

    #[tokio::test]
    async fn test_latest_prices() {
        let (service, _) = service();
        let prices = service
            .latest_prices(&["AAAA3".to_string(), "BBBB4".to_string()])
            .await;
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["AAAA3"], 12.0);
    }
}
