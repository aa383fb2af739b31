//! History cache for market data.
//!
//! Entries are keyed by `(ticker, lookback, bucket)` where
//! `bucket = unix_time / ttl`, so every entry lapses at the next bucket
//! boundary and all callers in the same window share one fetch.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

use super::provider::Lookback;
use crate::valuation::{DividendSeries, PriceSeries};

/// Default TTL: one hour
pub const DEFAULT_TTL_SECS: i64 = 3600;

/// Cache entry valid until the end of its bucket
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PriceKey {
    ticker: String,
    lookback: Lookback,
    bucket: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DividendKey {
    ticker: String,
    bucket: i64,
}

/// Price and dividend history cache
pub struct HistoryCache {
    prices: RwLock<HashMap<PriceKey, CacheEntry<PriceSeries>>>,
    dividends: RwLock<HashMap<DividendKey, CacheEntry<DividendSeries>>>,
    ttl_secs: i64,
}

impl HistoryCache {
    /// Create with the default TTL
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL_SECS)
    }

    /// Create with custom TTL (clamped to at least one second)
    pub fn with_ttl(ttl_secs: i64) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            dividends: RwLock::new(HashMap::new()),
            ttl_secs: ttl_secs.max(1),
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    fn bucket(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.ttl_secs)
    }

    fn bucket_end(&self, bucket: i64) -> DateTime<Utc> {
        Utc.timestamp_opt((bucket + 1) * self.ttl_secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn price_key(&self, ticker: &str, lookback: Lookback, now: DateTime<Utc>) -> PriceKey {
        PriceKey {
            ticker: ticker.to_uppercase(),
            lookback,
            bucket: self.bucket(now),
        }
    }

    fn dividend_key(&self, ticker: &str, now: DateTime<Utc>) -> DividendKey {
        DividendKey {
            ticker: ticker.to_uppercase(),
            bucket: self.bucket(now),
        }
    }

    /// Get cached prices for the current bucket
    pub fn get_prices(&self, ticker: &str, lookback: Lookback) -> Option<PriceSeries> {
        self.get_prices_at(ticker, lookback, Utc::now())
    }

    /// Get cached prices for the bucket containing `now`
    pub fn get_prices_at(
        &self,
        ticker: &str,
        lookback: Lookback,
        now: DateTime<Utc>,
    ) -> Option<PriceSeries> {
        let key = self.price_key(ticker, lookback, now);
        let cache = self.prices.read().ok()?;

        cache
            .get(&key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
    }

    /// Cache prices in the current bucket
    pub fn set_prices(&self, ticker: &str, lookback: Lookback, prices: PriceSeries) {
        self.set_prices_at(ticker, lookback, prices, Utc::now());
    }

    /// Cache prices in the bucket containing `now`
    pub fn set_prices_at(
        &self,
        ticker: &str,
        lookback: Lookback,
        prices: PriceSeries,
        now: DateTime<Utc>,
    ) {
        let key = self.price_key(ticker, lookback, now);
        let entry = CacheEntry {
            data: prices,
            expires_at: self.bucket_end(key.bucket),
        };

        if let Ok(mut cache) = self.prices.write() {
            cache.insert(key, entry);
        }
    }

    /// Get cached dividends for the current bucket
    pub fn get_dividends(&self, ticker: &str) -> Option<DividendSeries> {
        self.get_dividends_at(ticker, Utc::now())
    }

    pub fn get_dividends_at(&self, ticker: &str, now: DateTime<Utc>) -> Option<DividendSeries> {
        let key = self.dividend_key(ticker, now);
        let cache = self.dividends.read().ok()?;

        cache
            .get(&key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
    }

    /// Cache dividends in the current bucket
    pub fn set_dividends(&self, ticker: &str, dividends: DividendSeries) {
        self.set_dividends_at(ticker, dividends, Utc::now());
    }

    pub fn set_dividends_at(&self, ticker: &str, dividends: DividendSeries, now: DateTime<Utc>) {
        let key = self.dividend_key(ticker, now);
        let entry = CacheEntry {
            data: dividends,
            expires_at: self.bucket_end(key.bucket),
        };

        if let Ok(mut cache) = self.dividends.write() {
            cache.insert(key, entry);
        }
    }

    /// Drop every cached entry of a ticker, or only one lookback of it
    pub fn invalidate(&self, ticker: &str, lookback: Option<Lookback>) {
        let ticker = ticker.to_uppercase();

        if let Ok(mut cache) = self.prices.write() {
            cache.retain(|k, _| {
                k.ticker != ticker || lookback.is_some_and(|l| l != k.lookback)
            });
        }

        if lookback.is_none() {
            if let Ok(mut cache) = self.dividends.write() {
                cache.retain(|k, _| k.ticker != ticker);
            }
        }
    }

    /// Clear all expired entries
    pub fn clear_expired(&self) {
        let now = Utc::now();
        if let Ok(mut cache) = self.prices.write() {
            cache.retain(|_, entry| !entry.is_expired(now));
        }
        if let Ok(mut cache) = self.dividends.write() {
            cache.retain(|_, entry| !entry.is_expired(now));
        }
    }

    /// Clear all cache
    pub fn clear_all(&self) {
        if let Ok(mut cache) = self.prices.write() {
            cache.clear();
        }
        if let Ok(mut cache) = self.dividends.write() {
            cache.clear();
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let (price_total, price_expired) = self
            .prices
            .read()
            .map(|c| (c.len(), c.values().filter(|e| e.is_expired(now)).count()))
            .unwrap_or((0, 0));
        let (div_total, div_expired) = self
            .dividends
            .read()
            .map(|c| (c.len(), c.values().filter(|e| e.is_expired(now)).count()))
            .unwrap_or((0, 0));

        let total = price_total + div_total;
        let expired = price_expired + div_expired;

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

// ============================================================================
// Tests
// ============================================================================
