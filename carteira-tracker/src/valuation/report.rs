//! Human-readable valuation report.
//!
//! Only decides what to show. The scorer's result is never altered.

use serde::{Deserialize, Serialize};

use super::types::{HistoricalMetrics, MetricsOutcome, ValuationCategory, ValuationResult};

/// Figures shown next to the verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFigures {
    pub current_price: f64,
    pub avg_12m: f64,
    pub min_5y: f64,
    pub max_5y: f64,
    pub dividend_yield_pct: Option<f64>,
}

impl From<&HistoricalMetrics> for KeyFigures {
    fn from(m: &HistoricalMetrics) -> Self {
        Self {
            current_price: m.current_price,
            avg_12m: m.avg_12m,
            min_5y: m.min_5y,
            max_5y: m.max_5y,
            dividend_yield_pct: m.dividend_yield_pct,
        }
    }
}

/// Presentation of a valuation for a single ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationReport {
    pub ticker: String,
    pub category: ValuationCategory,
    pub score: i32,
    pub headline: String,
    /// Leading reasons, truncated per category
    pub highlights: Vec<String>,
    pub recommendation: String,
    pub risk_warning: Option<String>,
    pub figures: Option<KeyFigures>,
}

impl ValuationReport {
    pub fn from_result(ticker: &str, outcome: &MetricsOutcome, result: &ValuationResult) -> Self {
        let highlights = match result.category.display_reason_limit() {
            Some(limit) => result.rationale.iter().take(limit).cloned().collect(),
            None => result.rationale.clone(),
        };

        let risk_warning = result.risk_flag.then(|| {
            "Steep drop over the last year. Check for company-specific problems before buying."
                .to_string()
        });

        Self {
            ticker: ticker.to_string(),
            category: result.category,
            score: result.score,
            headline: headline(result.category).to_string(),
            highlights,
            recommendation: recommendation(result),
            risk_warning,
            figures: outcome.metrics().map(KeyFigures::from),
        }
    }
}

fn headline(category: ValuationCategory) -> &'static str {
    match category {
        ValuationCategory::NeutralNoData => "No price history available",
        ValuationCategory::Opportunity => "Opportunity: very cheap compared to its history",
        ValuationCategory::Cheap => "Cheap: below the historical average",
        ValuationCategory::Fair => "Fair price: inside the normal historical band",
        ValuationCategory::Caution => "Caution: above the historical average",
        ValuationCategory::Expensive => "Expensive: well above its history",
    }
}

fn recommendation(result: &ValuationResult) -> String {
    match result.category {
        ValuationCategory::NeutralNoData => {
            "Not enough history to judge the price. Evaluate by other means.".to_string()
        }
        ValuationCategory::Opportunity => "BUY: good entry point.".to_string(),
        ValuationCategory::Cheap => "Can buy: attractive price.".to_string(),
        ValuationCategory::Fair => "Neutral: neither cheap nor expensive.".to_string(),
        ValuationCategory::Caution => "Buy only if needed: price is high.".to_string(),
        ValuationCategory::Expensive => match result.ideal_entry_price {
            Some(ideal) => format!("Do not buy now. Wait for the price to reach {ideal:.2}."),
            None => "Do not buy now.".to_string(),
        },
    }
}
