//! Historical valuation.
//!
//! Scores a ticker by comparing its current price to its own history:
//!
//! - **Metrics**: 12-month average, 20/80 percentiles, historical range,
//!   change over the last year and trailing dividend yield
//! - **Score**: signed integer mapped to a [`ValuationCategory`]
//! - **Bazin**: ceiling price from the estimated annual dividend

pub mod analyzer;
pub mod report;
pub mod stats;
pub mod types;

pub use analyzer::{ScoringThresholds, ValuationScorer, TRADING_DAYS_PER_YEAR};
pub use report::{KeyFigures, ValuationReport};
pub use types::*;
