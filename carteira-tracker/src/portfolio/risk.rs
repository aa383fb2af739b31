//! Risk and return metrics of a price series.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::valuation::{PriceSeries, TRADING_DAYS_PER_YEAR};

/// Annualized risk/return figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Mean daily return × 252, in %
    pub annual_return_pct: f64,
    /// Sample std of daily returns × √252, in %; `None` with a single return
    pub annual_volatility_pct: Option<f64>,
    /// Deepest fall from a running peak, in % (≤ 0)
    pub max_drawdown_pct: f64,
    /// Daily returns the figures were computed from
    pub observations: usize,
}

/// Risk metrics of `series`; `None` with fewer than 2 prices.
pub fn risk_metrics(series: &PriceSeries) -> Option<RiskMetrics> {
    let closes = series.closes();
    if closes.len() < 2 {
        return None;
    }

    let returns: Vec<f64> = closes
        .windows(2)
        .map(|w| w[1] / w[0] - 1.0)
        .filter(|r| r.is_finite())
        .collect();
    if returns.is_empty() {
        return None;
    }

    let days = TRADING_DAYS_PER_YEAR as f64;
    let annual_return_pct = returns.iter().mean() * days * 100.0;
    let annual_volatility_pct =
        (returns.len() > 1).then(|| returns.iter().std_dev() * days.sqrt() * 100.0);

    let mut peak = f64::NEG_INFINITY;
    let mut max_drawdown_pct = 0.0_f64;
    for &close in &closes {
        peak = peak.max(close);
        if peak > 0.0 {
            max_drawdown_pct = max_drawdown_pct.min((close / peak - 1.0) * 100.0);
        }
    }

    Some(RiskMetrics {
        annual_return_pct,
        annual_volatility_pct,
        max_drawdown_pct,
        observations: returns.len(),
    })
}
