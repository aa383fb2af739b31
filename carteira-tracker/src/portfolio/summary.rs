//! Portfolio summary at market prices.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::{ClassTotals, HoldingBook};

/// One holding valued at its latest price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub ticker: String,
    pub asset_class: String,
    pub quantity: f64,
    pub avg_cost: f64,
    /// Latest price; `None` when the market data source had none
    pub price: Option<f64>,
    pub price_available: bool,
    /// `quantity × price`, 0 without a price
    pub market_value: f64,
    pub cost_basis: f64,
    /// `market_value − cost_basis`; `None` without a price
    pub profit_loss: Option<f64>,
    /// `(price / avg_cost − 1) × 100`; `None` without a price
    pub profit_loss_pct: Option<f64>,
}

/// Totals over all holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub positions: Vec<PositionSummary>,
    pub total_value: f64,
    /// Cost basis of every holding, priced or not
    pub total_cost: f64,
    /// Profit/loss of the priced holdings only
    pub total_profit_loss: f64,
    /// `total_profit_loss` over the cost basis of the priced holdings, in %;
    /// `None` when nothing is priced
    pub total_return_pct: Option<f64>,
    /// Market value per asset class, in first-seen order
    pub value_by_class: ClassTotals,
    /// Tickers without a price
    pub missing_prices: Vec<String>,
}

/// Value every holding at `prices` (ticker → last price).
pub fn summarize(book: &HoldingBook, prices: &HashMap<String, f64>) -> PortfolioSummary {
    let mut positions = Vec::with_capacity(book.len());
    let mut value_by_class = ClassTotals::new();
    let mut missing_prices = Vec::new();

    for holding in book.iter() {
        let price = prices
            .get(&holding.ticker)
            .copied()
            .filter(|p| p.is_finite() && *p >= 0.0);
        if price.is_none() {
            missing_prices.push(holding.ticker.clone());
        }

        let market_value = price.map_or(0.0, |p| holding.market_value(p));
        let cost_basis = holding.cost_basis();
        value_by_class.add(&holding.asset_class, market_value);

        positions.push(PositionSummary {
            ticker: holding.ticker.clone(),
            asset_class: holding.asset_class.clone(),
            quantity: holding.quantity,
            avg_cost: holding.avg_cost,
            price,
            price_available: price.is_some(),
            market_value,
            cost_basis,
            profit_loss: price.map(|_| market_value - cost_basis),
            profit_loss_pct: price.map(|p| (p / holding.avg_cost - 1.0) * 100.0),
        });
    }

    let total_value: f64 = positions.iter().map(|p| p.market_value).sum();
    let total_cost: f64 = positions.iter().map(|p| p.cost_basis).sum();
    let priced_cost: f64 = positions
        .iter()
        .filter(|p| p.price_available)
        .map(|p| p.cost_basis)
        .sum();
    let total_profit_loss: f64 = positions.iter().filter_map(|p| p.profit_loss).sum();
    let total_return_pct = (priced_cost > 0.0).then(|| total_profit_loss / priced_cost * 100.0);

    PortfolioSummary {
        positions,
        total_value,
        total_cost,
        total_profit_loss,
        total_return_pct,
        value_by_class,
        missing_prices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::Holding;

    fn book() -> HoldingBook {
        HoldingBook::from(vec![
            Holding::new("PETR4", 100.0, 30.0, "Stocks").unwrap(),
            Holding::new("HGLG11", 10.0, 150.0, "REITs").unwrap(),
            Holding::new("CDB-XP", 1.0, 1000.0, "Fixed income").unwrap(),
        ])
    }

    #[test]
    fn test_summary_values_and_pnl() {
        let prices = HashMap::from([("PETR4".to_string(), 36.0), ("HGLG11".to_string(), 150.0)]);
        let summary = summarize(&book(), &prices);

        let petr = &summary.positions[0];
        assert_eq!(petr.market_value, 3600.0);
        assert_eq!(petr.profit_loss, Some(600.0));
        assert!((petr.profit_loss_pct.unwrap() - 20.0).abs() < 1e-9);

        let cdb = &summary.positions[2];
        assert!(!cdb.price_available);
        assert_eq!(cdb.market_value, 0.0);
        assert_eq!(cdb.profit_loss, None);
        assert_eq!(cdb.profit_loss_pct, None);
        assert_eq!(summary.missing_prices, vec!["CDB-XP".to_string()]);

        assert_eq!(summary.total_value, 5100.0);
        assert_eq!(summary.total_cost, 5500.0);
        // The unpriced CDB stays out of the profit/loss totals
        assert_eq!(summary.total_profit_loss, 600.0);
        assert!((summary.total_return_pct.unwrap() - 600.0 / 4500.0 * 100.0).abs() < 1e-9);
        assert_eq!(summary.value_by_class.get("Stocks"), Some(3600.0));
        assert_eq!(summary.value_by_class.get("Fixed income"), Some(0.0));
    }

    #[test]
    fn test_nothing_priced() {
        let summary = summarize(&book(), &HashMap::new());
        assert_eq!(summary.total_profit_loss, 0.0);
        assert_eq!(summary.total_return_pct, None);
        assert_eq!(summary.missing_prices.len(), 3);
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize(&HoldingBook::new(), &HashMap::new());
        assert_eq!(summary.total_value, 0.0);
        assert_eq!(summary.total_return_pct, None);
        assert!(summary.value_by_class.is_empty());
    }
}
