//! Valuation System Types.
//!
//! Price/dividend series, the metrics derived from them and the outcome of
//! scoring a ticker against its own history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Input Series
// ============================================================================

/// A single daily closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Closing prices ordered ascending by date.
///
/// Non-finite closes are dropped on construction. An empty series is a
/// valid value meaning "no market history".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, sorting by date and dropping non-finite closes.
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.close.is_finite());
        points.sort_by_key(|p| p.date);
        Self { points }
    }

    /// Build a series of consecutive calendar days starting at `start`.
    pub fn from_closes(start: NaiveDate, closes: &[f64]) -> Self {
        let points = closes
            .iter()
            .zip(start.iter_days())
            .map(|(&close, date)| PricePoint { date, close })
            .collect();
        Self::new(points)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Closing prices in date order.
    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// Most recent point.
    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Most recent close.
    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }
}

/// A single cash distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub date: NaiveDate,
    pub amount: f64,
}

impl DividendEvent {
    pub fn new(date: NaiveDate, amount: f64) -> Self {
        Self { date, amount }
    }
}

/// Dividend events ordered ascending by date. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DividendSeries {
    events: Vec<DividendEvent>,
}

impl DividendSeries {
    /// Build a series, sorting by date and dropping non-finite amounts.
    pub fn new(mut events: Vec<DividendEvent>) -> Self {
        events.retain(|e| e.amount.is_finite());
        events.sort_by_key(|e| e.date);
        Self { events }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[DividendEvent] {
        &self.events
    }

    /// Amounts of the last `n` events (or all of them when fewer exist).
    pub fn last_amounts(&self, n: usize) -> Vec<f64> {
        let start = self.events.len().saturating_sub(n);
        self.events[start..].iter().map(|e| e.amount).collect()
    }
}

// ============================================================================
// Derived Metrics
// ============================================================================

/// Statistics of one ticker's price history, computed once per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMetrics {
    /// Last close
    pub current_price: f64,
    /// Mean of the last 252 closes (all closes when fewer exist)
    pub avg_12m: f64,
    /// Mean of the whole series
    pub avg_full: f64,
    /// 20th percentile of the whole series
    pub p20: f64,
    /// 80th percentile of the whole series
    pub p80: f64,
    /// Lowest close of the series
    pub min_5y: f64,
    /// Highest close of the series
    pub max_5y: f64,
    /// Change over the last 252 observations (%); 0 when the history is shorter
    pub annual_change_pct: f64,
    /// Trailing dividend yield (%); `None` without dividends or price
    pub dividend_yield_pct: Option<f64>,
    /// Number of closes the metrics were computed from
    pub observations: usize,
}

impl HistoricalMetrics {
    /// Position of the current price inside the [min, max] range, 0-100.
    ///
    /// A flat range yields 50.
    pub fn range_position(&self) -> f64 {
        if self.max_5y > self.min_5y {
            (self.current_price - self.min_5y) / (self.max_5y - self.min_5y) * 100.0
        } else {
            50.0
        }
    }
}

/// Result of computing metrics for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "metrics", rename_all = "snake_case")]
pub enum MetricsOutcome {
    /// Enough history to score
    Available(HistoricalMetrics),
    /// No price history (fixed income, freshly listed, unknown ticker)
    InsufficientData,
}

impl MetricsOutcome {
    pub fn metrics(&self) -> Option<&HistoricalMetrics> {
        match self {
            Self::Available(m) => Some(m),
            Self::InsufficientData => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

// ============================================================================
// Valuation Result
// ============================================================================

/// Discrete valuation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValuationCategory {
    /// No history to compare against
    NeutralNoData,
    /// Very cheap relative to history
    Opportunity,
    /// Below historical norms
    Cheap,
    /// Within the normal historical band
    Fair,
    /// Above historical norms
    Caution,
    /// Very expensive relative to history
    Expensive,
}

impl ValuationCategory {
    /// Whether the category suggests buying.
    pub fn is_buy_zone(&self) -> bool {
        matches!(self, Self::Opportunity | Self::Cheap)
    }

    /// Number of reasons shown when rendering this category.
    pub fn display_reason_limit(&self) -> Option<usize> {
        match self {
            Self::NeutralNoData => None,
            Self::Opportunity | Self::Expensive => Some(4),
            Self::Cheap | Self::Caution => Some(3),
            Self::Fair => Some(2),
        }
    }
}

impl std::fmt::Display for ValuationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeutralNoData => write!(f, "Insufficient data"),
            Self::Opportunity => write!(f, "Opportunity"),
            Self::Cheap => write!(f, "Cheap"),
            Self::Fair => write!(f, "Fair price"),
            Self::Caution => write!(f, "Caution"),
            Self::Expensive => write!(f, "Expensive"),
        }
    }
}

/// Outcome of scoring a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub category: ValuationCategory,
    /// Signed score; negative means cheap
    pub score: i32,
    /// Every triggered signal, in evaluation order
    pub rationale: Vec<String>,
    /// Suggested entry price, only set for expensive tickers
    pub ideal_entry_price: Option<f64>,
    /// Informational, does not affect the score
    pub dividend_yield_pct: Option<f64>,
    /// Set when the last year's drop crosses the crash threshold
    pub risk_flag: bool,
}

// ============================================================================
// Bazin Ceiling Price
// ============================================================================

/// Directive derived from the Bazin ceiling price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CeilingDirective {
    Buy,
    Wait,
}

impl std::fmt::Display for CeilingDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Wait => write!(f, "WAIT"),
        }
    }
}

/// Bazin ceiling price computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CeilingResult {
    /// Mean of the last 12 events, times 4
    pub annual_dividend_estimate: f64,
    pub desired_yield: f64,
    pub ceiling_price: f64,
    pub current_price: f64,
    /// Distance from the current price to the ceiling (%)
    pub upside_pct: f64,
    pub directive: CeilingDirective,
}

/// Outcome of the Bazin computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "ceiling", rename_all = "snake_case")]
pub enum BazinOutcome {
    Ceiling(CeilingResult),
    NoDividendData,
    /// No positive last close to compare against the ceiling
    NoPriceData,
    InvalidDesiredYield,
}

impl BazinOutcome {
    pub fn ceiling(&self) -> Option<&CeilingResult> {
        match self {
            Self::Ceiling(c) => Some(c),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_price_series_sorted_and_filtered() {
        let series = PriceSeries::new(vec![
            PricePoint::new(day(3), 12.0),
            PricePoint::new(day(1), 10.0),
            PricePoint::new(day(2), f64::NAN),
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![10.0, 12.0]);
        assert_eq!(series.last_close(), Some(12.0));
    }

    #[test]
    fn test_from_closes_assigns_consecutive_days() {
        let series = PriceSeries::from_closes(day(1), &[1.0, 2.0, 3.0]);
        assert_eq!(series.points()[2].date, day(3));
    }

    #[test]
    fn test_dividend_last_amounts() {
        let series = DividendSeries::new(
            (1..=5).map(|d| DividendEvent::new(day(d), d as f64)).collect(),
        );
        assert_eq!(series.last_amounts(2), vec![4.0, 5.0]);
        assert_eq!(series.last_amounts(10).len(), 5);
        assert!(DividendSeries::empty().last_amounts(12).is_empty());
    }

    #[test]
    fn test_range_position_flat_is_fifty() {
        let metrics = HistoricalMetrics {
            current_price: 10.0,
            avg_12m: 10.0,
            avg_full: 10.0,
            p20: 10.0,
            p80: 10.0,
            min_5y: 10.0,
            max_5y: 10.0,
            annual_change_pct: 0.0,
            dividend_yield_pct: None,
            observations: 3,
        };
        assert_eq!(metrics.range_position(), 50.0);
    }

    #[test]
    fn test_category_reason_limits() {
        assert_eq!(ValuationCategory::Opportunity.display_reason_limit(), Some(4));
        assert_eq!(ValuationCategory::Fair.display_reason_limit(), Some(2));
        assert_eq!(ValuationCategory::NeutralNoData.display_reason_limit(), None);
        assert!(ValuationCategory::Cheap.is_buy_zone());
        assert!(!ValuationCategory::Caution.is_buy_zone());
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&ValuationCategory::NeutralNoData).unwrap();
        assert_eq!(json, "\"NEUTRAL_NO_DATA\"");
        assert_eq!(CeilingDirective::Wait.to_string(), "WAIT");
    }
}
