//! Market data provider abstraction.
//!
//! Defines the `MarketDataProvider` trait implemented by every source of
//! price and dividend history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::valuation::{DividendSeries, PriceSeries};

// ============================================================================
// Lookback Window
// ============================================================================

/// History window requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Lookback {
    OneDay,
    FiveDays,
    OneMonth,
    SixMonths,
    OneYear,
    #[default]
    FiveYears,
    /// Whole available history
    Max,
}

impl Lookback {
    pub const ALL: [Lookback; 7] = [
        Self::OneDay,
        Self::FiveDays,
        Self::OneMonth,
        Self::SixMonths,
        Self::OneYear,
        Self::FiveYears,
        Self::Max,
    ];

    /// Range code understood by chart APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::FiveYears => "5y",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lookback {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == code)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("unknown lookback: {}", s)))
    }
}

impl TryFrom<String> for Lookback {
    type Error = ProviderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Lookback> for String {
    fn from(lookback: Lookback) -> Self {
        lookback.as_str().to_string()
    }
}

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to market data providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Unknown symbol or no data for it
    DataNotAvailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Response could not be decoded
    Parse(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }
}

impl From<ProviderError> for carteira_common::Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited { .. } => Self::RateLimited(err.to_string()),
            ProviderError::DataNotAvailable(msg) => Self::NotFound(msg),
            ProviderError::InvalidRequest(msg) => Self::InvalidInput(msg),
            ProviderError::Network(_) | ProviderError::Parse(_) => Self::External(err.to_string()),
        }
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Source of historical market data.
///
/// Both calls may legitimately return empty series (fixed income, freshly
/// listed tickers); errors are reserved for failures.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name (e.g., "yahoo")
    fn name(&self) -> &'static str;

    /// Daily closes for `ticker` over `lookback`, ascending by date.
    async fn get_price_history(
        &self,
        ticker: &str,
        lookback: Lookback,
    ) -> Result<PriceSeries, ProviderError>;

    /// Every known dividend event of `ticker`, ascending by date.
    async fn get_dividend_history(&self, ticker: &str) -> Result<DividendSeries, ProviderError>;
}
