//! Valuation Scorer.
//!
//! Scores a ticker against its own price history: 12-month average,
//! historical percentiles, position inside the historical range and the
//! change over the last year. Also computes the Bazin ceiling price.
//!
//! The scorer is stateless. Fetching and caching history is done by
//! [`crate::data::HistoryService`].

use carteira_common::config::{
    ValuationConfig, DEFAULT_CAUTION_MAX, DEFAULT_CHEAP_MAX, DEFAULT_DESIRED_YIELD,
    DEFAULT_FAIR_MAX, DEFAULT_OPPORTUNITY_MAX,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stats;
use super::types::*;

/// Trading sessions in a year.
pub const TRADING_DAYS_PER_YEAR: usize = 252;

/// Dividend events considered for the trailing yield.
const YIELD_WINDOW_EVENTS: usize = 24;

/// Events summed for the trailing twelve months.
const TRAILING_EVENTS: usize = 12;

/// Events averaged by the Bazin estimate.
const BAZIN_EVENTS: usize = 12;

/// Bazin annualization factor applied to the per-event mean.
const BAZIN_ANNUALIZATION: f64 = 4.0;

// ============================================================================
// Thresholds
// ============================================================================

/// Scoring thresholds and weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringThresholds {
    /// Ratio to the 12-month average for the strongest discount signal
    pub avg_deep_discount: f64,
    /// Ratio to the 12-month average for the moderate discount signal
    pub avg_discount: f64,
    /// Ratio to the 12-month average for the moderate premium signal
    pub avg_premium: f64,
    /// Ratio to the 12-month average for the strongest premium signal
    pub avg_deep_premium: f64,
    pub avg_strong_weight: i32,
    pub avg_moderate_weight: i32,
    pub avg_mild_weight: i32,

    /// Lower percentile band (fraction)
    pub low_percentile: f64,
    /// Upper percentile band (fraction)
    pub high_percentile: f64,
    pub percentile_weight: i32,

    /// Range position (0-100) bands
    pub range_extreme_low: f64,
    pub range_low: f64,
    pub range_high: f64,
    pub range_extreme_high: f64,
    pub range_extreme_weight: i32,
    pub range_weight: i32,

    /// Annual change (%) bands
    pub annual_crash_pct: f64,
    pub annual_drop_pct: f64,
    pub annual_dip_pct: f64,
    pub annual_rally_pct: f64,
    pub annual_surge_pct: f64,
    pub annual_drop_weight: i32,
    pub annual_dip_weight: i32,
    pub annual_surge_weight: i32,
    pub annual_rally_weight: i32,

    /// Category upper bounds (inclusive)
    pub opportunity_max: i32,
    pub cheap_max: i32,
    pub fair_max: i32,
    pub caution_max: i32,

    /// Fraction of the 12-month average suggested as entry for expensive tickers
    pub entry_discount: f64,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            avg_deep_discount: 0.85,
            avg_discount: 0.90,
            avg_premium: 1.10,
            avg_deep_premium: 1.15,
            avg_strong_weight: 25,
            avg_moderate_weight: 20,
            avg_mild_weight: 10,

            low_percentile: 0.20,
            high_percentile: 0.80,
            percentile_weight: 30,

            range_extreme_low: 15.0,
            range_low: 30.0,
            range_high: 70.0,
            range_extreme_high: 85.0,
            range_extreme_weight: 25,
            range_weight: 15,

            annual_crash_pct: -50.0,
            annual_drop_pct: -20.0,
            annual_dip_pct: -10.0,
            annual_rally_pct: 30.0,
            annual_surge_pct: 50.0,
            annual_drop_weight: 20,
            annual_dip_weight: 10,
            annual_surge_weight: 25,
            annual_rally_weight: 15,

            opportunity_max: DEFAULT_OPPORTUNITY_MAX,
            cheap_max: DEFAULT_CHEAP_MAX,
            fair_max: DEFAULT_FAIR_MAX,
            caution_max: DEFAULT_CAUTION_MAX,

            entry_discount: 0.9,
        }
    }
}

impl ScoringThresholds {
    /// Defaults with the overrides present in the configuration applied.
    pub fn from_config(config: &ValuationConfig) -> Self {
        let defaults = Self::default();
        let [opportunity_max, cheap_max, fair_max, caution_max] = config.category_cutoffs();
        Self {
            entry_discount: config.entry_discount.unwrap_or(defaults.entry_discount),
            opportunity_max,
            cheap_max,
            fair_max,
            caution_max,
            ..defaults
        }
    }

    /// Map a score to its category.
    pub fn categorize(&self, score: i32) -> ValuationCategory {
        if score <= self.opportunity_max {
            ValuationCategory::Opportunity
        } else if score <= self.cheap_max {
            ValuationCategory::Cheap
        } else if score <= self.fair_max {
            ValuationCategory::Fair
        } else if score <= self.caution_max {
            ValuationCategory::Caution
        } else {
            ValuationCategory::Expensive
        }
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Historical valuation scorer.
#[derive(Debug, Clone)]
pub struct ValuationScorer {
    thresholds: ScoringThresholds,
    desired_yield: f64,
}

impl ValuationScorer {
    /// Create a scorer with default thresholds.
    pub fn new() -> Self {
        Self::with_thresholds(ScoringThresholds::default())
    }

    /// Create with custom thresholds.
    pub fn with_thresholds(thresholds: ScoringThresholds) -> Self {
        Self {
            thresholds,
            desired_yield: DEFAULT_DESIRED_YIELD,
        }
    }

    /// Create from the valuation section of the configuration.
    pub fn from_config(config: &ValuationConfig) -> Self {
        Self {
            thresholds: ScoringThresholds::from_config(config),
            desired_yield: config.desired_yield(),
        }
    }

    pub fn thresholds(&self) -> &ScoringThresholds {
        &self.thresholds
    }

    /// Desired yield used when a caller does not supply one.
    pub fn default_desired_yield(&self) -> f64 {
        self.desired_yield
    }

    /// Compute the historical metrics of a price series.
    ///
    /// An empty series yields [`MetricsOutcome::InsufficientData`].
    pub fn compute_metrics(
        &self,
        prices: &PriceSeries,
        dividends: &DividendSeries,
    ) -> MetricsOutcome {
        let closes = prices.closes();
        let (Some(current_price), Some(avg_full), Some(min_5y), Some(max_5y)) = (
            closes.last().copied(),
            stats::mean(&closes),
            stats::min(&closes),
            stats::max(&closes),
        ) else {
            return MetricsOutcome::InsufficientData;
        };

        let avg_12m = stats::tail_mean(&closes, TRADING_DAYS_PER_YEAR).unwrap_or(avg_full);
        let p20 = stats::quantile(&closes, self.thresholds.low_percentile).unwrap_or(min_5y);
        let p80 = stats::quantile(&closes, self.thresholds.high_percentile).unwrap_or(max_5y);

        let annual_change_pct = if closes.len() > TRADING_DAYS_PER_YEAR {
            let year_ago = closes[closes.len() - TRADING_DAYS_PER_YEAR];
            if year_ago != 0.0 {
                (current_price / year_ago - 1.0) * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        MetricsOutcome::Available(HistoricalMetrics {
            current_price,
            avg_12m,
            avg_full,
            p20,
            p80,
            min_5y,
            max_5y,
            annual_change_pct,
            dividend_yield_pct: trailing_dividend_yield(dividends, current_price),
            observations: closes.len(),
        })
    }

    /// Score a metrics outcome.
    pub fn score(&self, outcome: &MetricsOutcome) -> ValuationResult {
        let Some(metrics) = outcome.metrics() else {
            return ValuationResult {
                category: ValuationCategory::NeutralNoData,
                score: 0,
                rationale: vec!["insufficient historical data".to_string()],
                ideal_entry_price: None,
                dividend_yield_pct: None,
                risk_flag: false,
            };
        };

        let t = &self.thresholds;
        let price = metrics.current_price;
        let mut score = 0;
        let mut rationale = Vec::new();
        let mut risk_flag = false;

        // 12-month average
        let avg = metrics.avg_12m;
        if price < avg * t.avg_deep_discount {
            score -= t.avg_strong_weight;
            rationale.push(format!(
                "price {:.0}% below the 12-month average",
                (1.0 - t.avg_deep_discount) * 100.0
            ));
        } else if price < avg * t.avg_discount {
            score -= t.avg_moderate_weight;
            rationale.push(format!(
                "price {:.0}% below the 12-month average",
                (1.0 - t.avg_discount) * 100.0
            ));
        } else if price < avg {
            score -= t.avg_mild_weight;
            rationale.push("price below the 12-month average".to_string());
        } else if price > avg * t.avg_deep_premium {
            score += t.avg_strong_weight;
            rationale.push(format!(
                "price {:.0}% above the 12-month average",
                (t.avg_deep_premium - 1.0) * 100.0
            ));
        } else if price > avg * t.avg_premium {
            score += t.avg_moderate_weight;
            rationale.push(format!(
                "price {:.0}% above the 12-month average",
                (t.avg_premium - 1.0) * 100.0
            ));
        } else if price > avg {
            score += t.avg_mild_weight;
            rationale.push("price above the 12-month average".to_string());
        }

        // Percentile bands
        if price < metrics.p20 {
            score -= t.percentile_weight;
            rationale.push(format!(
                "among the lowest {:.0}% of prices in the history",
                t.low_percentile * 100.0
            ));
        } else if price > metrics.p80 {
            score += t.percentile_weight;
            rationale.push(format!(
                "among the highest {:.0}% of prices in the history",
                (1.0 - t.high_percentile) * 100.0
            ));
        }

        // Position inside the historical range
        let position = metrics.range_position();
        if position < t.range_extreme_low {
            score -= t.range_extreme_weight;
            rationale.push(format!("close to the historical low ({:.2})", metrics.min_5y));
        } else if position < t.range_low {
            score -= t.range_weight;
            rationale.push("in the lower band of the historical range".to_string());
        } else if position > t.range_extreme_high {
            score += t.range_extreme_weight;
            rationale.push(format!("close to the historical high ({:.2})", metrics.max_5y));
        } else if position > t.range_high {
            score += t.range_weight;
            rationale.push("in the upper band of the historical range".to_string());
        }

        // Change over the last year
        let change = metrics.annual_change_pct;
        if change < t.annual_drop_pct {
            score -= t.annual_drop_weight;
            rationale.push(format!("fell {:.1}% over the last year", change.abs()));
            if change < t.annual_crash_pct {
                risk_flag = true;
                rationale.push(format!(
                    "risk alert: dropped more than {:.0}% in a year, review fundamentals before buying",
                    t.annual_crash_pct.abs()
                ));
            }
        } else if change < t.annual_dip_pct {
            score -= t.annual_dip_weight;
            rationale.push(format!("fell {:.1}% over the last year", change.abs()));
        } else if change > t.annual_surge_pct {
            score += t.annual_surge_weight;
            rationale.push(format!("rose {:.1}% over the last year", change));
        } else if change > t.annual_rally_pct {
            score += t.annual_rally_weight;
            rationale.push(format!("rose {:.1}% over the last year", change));
        }

        let category = t.categorize(score);
        let ideal_entry_price =
            (category == ValuationCategory::Expensive).then(|| avg * t.entry_discount);

        debug!(
            score,
            category = %category,
            signals = rationale.len(),
            "Scored price history"
        );

        ValuationResult {
            category,
            score,
            rationale,
            ideal_entry_price,
            dividend_yield_pct: metrics.dividend_yield_pct,
            risk_flag,
        }
    }

    /// Compute metrics and score them in one step.
    pub fn evaluate(
        &self,
        prices: &PriceSeries,
        dividends: &DividendSeries,
    ) -> (MetricsOutcome, ValuationResult) {
        let outcome = self.compute_metrics(prices, dividends);
        let result = self.score(&outcome);
        (outcome, result)
    }

    /// Bazin ceiling price: the price at which the estimated annual dividend
    /// pays `desired_yield`.
    pub fn bazin_ceiling_price(
        &self,
        dividends: &DividendSeries,
        current_price: f64,
        desired_yield: f64,
    ) -> BazinOutcome {
        if !desired_yield.is_finite() || desired_yield <= 0.0 {
            return BazinOutcome::InvalidDesiredYield;
        }

        let Some(mean_event) = stats::mean(&dividends.last_amounts(BAZIN_EVENTS)) else {
            return BazinOutcome::NoDividendData;
        };

        if !(current_price.is_finite() && current_price > 0.0) {
            return BazinOutcome::NoPriceData;
        }

        let annual_dividend_estimate = mean_event * BAZIN_ANNUALIZATION;
        let ceiling_price = annual_dividend_estimate / desired_yield;
        let upside_pct = (ceiling_price - current_price) / current_price * 100.0;
        let directive = if current_price <= ceiling_price {
            CeilingDirective::Buy
        } else {
            CeilingDirective::Wait
        };

        BazinOutcome::Ceiling(CeilingResult {
            annual_dividend_estimate,
            desired_yield,
            ceiling_price,
            current_price,
            upside_pct,
            directive,
        })
    }
}

impl Default for ValuationScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Trailing dividend yield (%).
///
/// Uses the last 24 events: the sum of the last 12, or the per-event mean
/// times 12 when fewer than 12 exist.
fn trailing_dividend_yield(dividends: &DividendSeries, current_price: f64) -> Option<f64> {
    if current_price <= 0.0 {
        return None;
    }

    let window = dividends.last_amounts(YIELD_WINDOW_EVENTS);
    if window.is_empty() {
        return None;
    }

    let annual = if window.len() >= TRAILING_EVENTS {
        window[window.len() - TRAILING_EVENTS..].iter().sum::<f64>()
    } else {
        stats::mean(&window)? * TRAILING_EVENTS as f64
    };

    Some(annual / current_price * 100.0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    fn metrics(price: f64, avg: f64, p20: f64, p80: f64, min: f64, max: f64, change: f64) -> MetricsOutcome {
        MetricsOutcome::Available(HistoricalMetrics {
            current_price: price,
            avg_12m: avg,
            avg_full: avg,
            p20,
            p80,
            min_5y: min,
            max_5y: max,
            annual_change_pct: change,
            dividend_yield_pct: None,
            observations: 500,
        })
    }

    fn monthly_dividends(amounts: &[f64]) -> DividendSeries {
        DividendSeries::new(
            amounts
                .iter()
                .enumerate()
                .map(|(i, &a)| DividendEvent::new(start() + chrono::Days::new(30 * i as u64), a))
                .collect(),
        )
    }

    #[test]
    fn test_empty_series_is_insufficient() {
        let scorer = ValuationScorer::new();
        let outcome = scorer.compute_metrics(&PriceSeries::default(), &DividendSeries::empty());
        assert_eq!(outcome, MetricsOutcome::InsufficientData);

        let result = scorer.score(&outcome);
        assert_eq!(result.category, ValuationCategory::NeutralNoData);
        assert_eq!(result.score, 0);
        assert_eq!(result.rationale, vec!["insufficient historical data".to_string()]);
    }

    #[test]
    fn test_metrics_short_series() {
        let scorer = ValuationScorer::new();
        let prices = PriceSeries::from_closes(start(), &[10.0, 20.0, 30.0]);
        let outcome = scorer.compute_metrics(&prices, &DividendSeries::empty());
        let m = outcome.metrics().unwrap();

        assert_eq!(m.current_price, 30.0);
        assert_eq!(m.avg_12m, 20.0);
        assert_eq!(m.min_5y, 10.0);
        assert_eq!(m.max_5y, 30.0);
        assert_eq!(m.annual_change_pct, 0.0);
        assert_eq!(m.dividend_yield_pct, None);
        assert!((m.p20 - 14.0).abs() < 1e-9);
        assert!((m.p80 - 26.0).abs() < 1e-9);
    }

    #[test]
    fn test_annual_change_needs_more_than_a_year() {
        let scorer = ValuationScorer::new();

        let exactly_a_year: Vec<f64> = (0..252).map(|i| 10.0 + i as f64).collect();
        let outcome =
            scorer.compute_metrics(&PriceSeries::from_closes(start(), &exactly_a_year), &DividendSeries::empty());
        assert_eq!(outcome.metrics().unwrap().annual_change_pct, 0.0);

        let mut longer = vec![50.0; 253];
        longer[1] = 40.0;
        longer[252] = 60.0;
        let outcome =
            scorer.compute_metrics(&PriceSeries::from_closes(start(), &longer), &DividendSeries::empty());
        let m = outcome.metrics().unwrap();
        assert!((m.annual_change_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_avg_12m_uses_last_252_closes() {
        let scorer = ValuationScorer::new();
        let mut closes = vec![1000.0; 48];
        closes.extend(std::iter::repeat(10.0).take(252));
        let outcome = scorer.compute_metrics(&PriceSeries::from_closes(start(), &closes), &DividendSeries::empty());
        let m = outcome.metrics().unwrap();
        assert_eq!(m.avg_12m, 10.0);
        assert!(m.avg_full > m.avg_12m);
    }

    #[test]
    fn test_dividend_yield_trailing_sum() {
        let scorer = ValuationScorer::new();
        let prices = PriceSeries::from_closes(start(), &[100.0]);

        // 14 events: last 12 are 1.0, older ones ignored
        let mut amounts = vec![5.0, 5.0];
        amounts.extend(vec![1.0; 12]);
        let outcome = scorer.compute_metrics(&prices, &monthly_dividends(&amounts));
        let dy = outcome.metrics().unwrap().dividend_yield_pct.unwrap();
        assert!((dy - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_dividend_yield_annualizes_short_history() {
        let scorer = ValuationScorer::new();
        let prices = PriceSeries::from_closes(start(), &[50.0]);
        let outcome = scorer.compute_metrics(&prices, &monthly_dividends(&[0.5, 0.5, 0.5]));
        let dy = outcome.metrics().unwrap().dividend_yield_pct.unwrap();
        assert!((dy - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_dividend_yield_none_for_non_positive_price() {
        let scorer = ValuationScorer::new();
        let prices = PriceSeries::from_closes(start(), &[0.0]);
        let outcome = scorer.compute_metrics(&prices, &monthly_dividends(&[1.0]));
        assert_eq!(outcome.metrics().unwrap().dividend_yield_pct, None);
    }

    #[test]
    fn test_flat_series_is_fair() {
        let scorer = ValuationScorer::new();
        let prices = PriceSeries::from_closes(start(), &[42.0; 300]);
        let (_, result) = scorer.evaluate(&prices, &DividendSeries::empty());
        assert_eq!(result.score, 0);
        assert_eq!(result.category, ValuationCategory::Fair);
        assert!(result.rationale.is_empty());
    }

    #[test]
    fn test_worked_example_is_cheap() {
        let scorer = ValuationScorer::new();
        let result = scorer.score(&metrics(80.0, 100.0, 70.0, 130.0, 50.0, 150.0, -5.0));
        assert_eq!(result.score, -25);
        assert_eq!(result.category, ValuationCategory::Cheap);
        assert_eq!(result.ideal_entry_price, None);
        assert!(!result.risk_flag);
    }

    #[test]
    fn test_maximum_discount_is_opportunity() {
        let scorer = ValuationScorer::new();
        let result = scorer.score(&metrics(10.0, 100.0, 50.0, 150.0, 9.0, 200.0, -60.0));
        assert_eq!(result.score, -25 - 30 - 25 - 20);
        assert_eq!(result.category, ValuationCategory::Opportunity);
        assert!(result.risk_flag);
        assert_eq!(result.rationale.len(), 5);
        assert!(result.rationale[4].starts_with("risk alert"));
    }

    #[test]
    fn test_expensive_has_ideal_entry_price() {
        let scorer = ValuationScorer::new();
        let result = scorer.score(&metrics(200.0, 100.0, 50.0, 150.0, 40.0, 210.0, 60.0));
        assert_eq!(result.score, 25 + 30 + 25 + 25);
        assert_eq!(result.category, ValuationCategory::Expensive);
        let ideal = result.ideal_entry_price.unwrap();
        assert!((ideal - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_category_boundaries() {
        let t = ScoringThresholds::default();
        assert_eq!(t.categorize(-40), ValuationCategory::Opportunity);
        assert_eq!(t.categorize(-39), ValuationCategory::Cheap);
        assert_eq!(t.categorize(-20), ValuationCategory::Cheap);
        assert_eq!(t.categorize(-19), ValuationCategory::Fair);
        assert_eq!(t.categorize(0), ValuationCategory::Fair);
        assert_eq!(t.categorize(1), ValuationCategory::Caution);
        assert_eq!(t.categorize(20), ValuationCategory::Caution);
        assert_eq!(t.categorize(21), ValuationCategory::Expensive);
    }

    #[test]
    fn test_thresholds_from_config() {
        let config = ValuationConfig {
            cheap_max: Some(-10),
            entry_discount: Some(0.8),
            ..Default::default()
        };
        let t = ScoringThresholds::from_config(&config);
        assert_eq!(t.cheap_max, -10);
        assert_eq!(t.entry_discount, 0.8);
        assert_eq!(t.opportunity_max, -40);
    }

    #[test]
    fn test_bazin_ceiling() {
        let scorer = ValuationScorer::new();
        let dividends = monthly_dividends(&[0.5; 12]);

        let outcome = scorer.bazin_ceiling_price(&dividends, 30.0, 0.06);
        let ceiling = outcome.ceiling().unwrap();
        assert!((ceiling.annual_dividend_estimate - 2.0).abs() < 1e-9);
        assert!((ceiling.ceiling_price - 33.333_333).abs() < 1e-3);
        assert_eq!(ceiling.directive, CeilingDirective::Buy);
        assert!(ceiling.upside_pct > 0.0);

        let outcome = scorer.bazin_ceiling_price(&dividends, 40.0, 0.06);
        assert_eq!(outcome.ceiling().unwrap().directive, CeilingDirective::Wait);
    }

    #[test]
    fn test_bazin_uses_last_twelve_events() {
        let scorer = ValuationScorer::new();
        let mut amounts = vec![10.0; 6];
        amounts.extend(vec![1.0; 12]);
        let outcome = scorer.bazin_ceiling_price(&monthly_dividends(&amounts), 10.0, 0.1);
        assert!((outcome.ceiling().unwrap().ceiling_price - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_bazin_edge_cases() {
        let scorer = ValuationScorer::new();
        assert_eq!(
            scorer.bazin_ceiling_price(&DividendSeries::empty(), 10.0, 0.06),
            BazinOutcome::NoDividendData
        );

        let dividends = monthly_dividends(&[1.0]);
        assert_eq!(
            scorer.bazin_ceiling_price(&dividends, 10.0, 0.0),
            BazinOutcome::InvalidDesiredYield
        );
        assert_eq!(
            scorer.bazin_ceiling_price(&dividends, 10.0, f64::NAN),
            BazinOutcome::InvalidDesiredYield
        );

        assert_eq!(
            scorer.bazin_ceiling_price(&dividends, 0.0, 0.06),
            BazinOutcome::NoPriceData
        );
        assert_eq!(
            scorer.bazin_ceiling_price(&dividends, f64::NAN, 0.06),
            BazinOutcome::NoPriceData
        );
    }
}
