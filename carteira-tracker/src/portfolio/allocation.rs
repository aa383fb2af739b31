//! Rebalancing Planner.
//!
//! Splits the portfolio (plus any new contribution) across asset classes
//! according to target percentages and reports how far each class is from
//! its target.
//!
//! ```text
//! total        = Σ current value per class + new capital
//! target_value = total × target_pct / 100
//! gap          = target_value − current_value
//!                  > 0  BUY
//!                  < 0  SELL
//!                  = 0  HOLD
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use carteira_tracker::portfolio::{ClassTotals, RebalancingPlanner};
//!
//! let planner = RebalancingPlanner::new();
//! let directives = planner.plan(&value_by_class, &targets, 1_000.0);
//! ```

use carteira_common::config::PlannerSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{AllocationTargets, ClassTotals};

// ============================================================================
// Configuration
// ============================================================================

/// Planner configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Rescale targets so they sum to 100 before planning
    pub normalize_targets: bool,
    /// Gaps with an absolute value up to this amount are reported as HOLD
    pub hold_tolerance: f64,
}

impl From<&PlannerSettings> for PlannerConfig {
    fn from(settings: &PlannerSettings) -> Self {
        Self {
            normalize_targets: settings.normalize_targets,
            hold_tolerance: settings.hold_tolerance.max(0.0),
        }
    }
}

// ============================================================================
// Directives
// ============================================================================

/// Action suggested for an asset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebalanceAction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for RebalanceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Rebalancing outcome for one asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDirective {
    pub asset_class: String,
    pub current_value: f64,
    /// Share of the total (new capital included), 0 when the total is 0
    pub current_pct: f64,
    pub target_pct: f64,
    pub target_value: f64,
    /// `target_value - current_value`
    pub gap: f64,
    pub action: RebalanceAction,
}

// ============================================================================
// Planner
// ============================================================================

/// Target-allocation rebalancing planner.
#[derive(Debug, Clone, Default)]
pub struct RebalancingPlanner {
    config: PlannerConfig,
}

impl RebalancingPlanner {
    /// Planner with the exact `gap == 0` HOLD rule and no normalization.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// One directive per target class, in target order.
    ///
    /// Classes held but absent from `targets` only count toward the total.
    /// Negative `new_capital` is treated as 0.
    pub fn plan(
        &self,
        holdings_by_class: &ClassTotals,
        targets: &AllocationTargets,
        new_capital: f64,
    ) -> Vec<ClassDirective> {
        let new_capital = if new_capital < 0.0 {
            warn!(new_capital, "Negative contribution ignored");
            0.0
        } else {
            new_capital
        };

        let normalized;
        let targets = if self.config.normalize_targets {
            normalized = targets.normalized();
            &normalized
        } else {
            targets
        };

        let total = holdings_by_class.total() + new_capital;

        let directives: Vec<ClassDirective> = targets
            .iter()
            .map(|target| {
                let current_value = holdings_by_class.get(&target.asset_class).unwrap_or(0.0);
                let current_pct = if total > 0.0 {
                    current_value / total * 100.0
                } else {
                    0.0
                };
                let target_value = total * target.target_pct / 100.0;
                let gap = target_value - current_value;

                ClassDirective {
                    asset_class: target.asset_class.clone(),
                    current_value,
                    current_pct,
                    target_pct: target.target_pct,
                    target_value,
                    gap,
                    action: self.action_for(gap),
                }
            })
            .collect();

        debug!(
            total,
            new_capital,
            classes = directives.len(),
            "Rebalancing plan computed"
        );

        directives
    }

    fn action_for(&self, gap: f64) -> RebalanceAction {
        if gap.abs() <= self.config.hold_tolerance {
            RebalanceAction::Hold
        } else if gap > 0.0 {
            RebalanceAction::Buy
        } else {
            RebalanceAction::Sell
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
