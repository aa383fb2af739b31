//! Portfolio Module.
//!
//! # Components
//!
//! - **Holdings**: validated positions kept in a [`HoldingBook`]
//! - **Rebalancing**: per-class BUY/SELL/HOLD directives toward target percentages
//! - **Summary**: market value and profit/loss per holding
//! - **Concentration**: alerts for classes with an outsized share
//! - **Risk**: annualized return, volatility and max drawdown

pub mod allocation;
pub mod concentration;
pub mod risk;
pub mod summary;
pub mod types;

pub use allocation::{ClassDirective, PlannerConfig, RebalanceAction, RebalancingPlanner};
pub use concentration::{concentration_alerts, ConcentrationAlert, ConcentrationLevel};
pub use risk::{risk_metrics, RiskMetrics};
pub use summary::{summarize, PortfolioSummary, PositionSummary};
pub use types::{
    normalize_ticker, AllocationTargets, ClassTotals, Holding, HoldingBook, HoldingError,
    TargetAllocation,
};
