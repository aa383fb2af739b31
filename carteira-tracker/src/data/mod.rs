//! Market data and persistence.
//!
//! # Components
//!
//! - **Provider**: `MarketDataProvider` trait and `ProviderError`
//! - **Yahoo**: chart API adapter
//! - **Cache**: bucketed TTL cache for price and dividend history
//! - **History**: provider access through the cache, plus scoring
//! - **Local storage**: SQLite persistence of holdings and targets

pub mod cache;
pub mod history;
pub mod local_storage;
pub mod provider;
pub mod yahoo;

pub use cache::{CacheStats, HistoryCache};
pub use history::{HistoryService, TickerValuation};
pub use local_storage::LocalStorage;
pub use provider::{Lookback, MarketDataProvider, ProviderError};
pub use yahoo::{to_yahoo_symbol, YahooFinanceProvider};
