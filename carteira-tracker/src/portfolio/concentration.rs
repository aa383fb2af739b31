//! Asset class concentration alerts.

use serde::{Deserialize, Serialize};

use super::types::ClassTotals;

/// Concentration severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConcentrationLevel {
    /// More than 20% in one class
    Medium,
    /// More than 30% in one class
    High,
    /// More than 50% in one class
    Critical,
}

impl ConcentrationLevel {
    /// Level for a share (%), if any.
    pub fn from_share(share_pct: f64) -> Option<Self> {
        if share_pct > 50.0 {
            Some(Self::Critical)
        } else if share_pct > 30.0 {
            Some(Self::High)
        } else if share_pct > 20.0 {
            Some(Self::Medium)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ConcentrationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A class holding an outsized share of the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationAlert {
    pub asset_class: String,
    pub share_pct: f64,
    pub level: ConcentrationLevel,
    pub message: String,
}

/// Alerts for every class above 20% of the total, in class order.
pub fn concentration_alerts(value_by_class: &ClassTotals) -> Vec<ConcentrationAlert> {
    let total = value_by_class.total();
    if total <= 0.0 {
        return Vec::new();
    }

    value_by_class
        .iter()
        .filter_map(|(class, value)| {
            let share_pct = value / total * 100.0;
            let level = ConcentrationLevel::from_share(share_pct)?;
            let message = match level {
                ConcentrationLevel::Critical => {
                    format!("{share_pct:.1}% in {class}: very high concentration")
                }
                ConcentrationLevel::High => format!("{share_pct:.1}% in {class}: heavy exposure"),
                ConcentrationLevel::Medium => {
                    format!("{share_pct:.1}% in {class}: within the recommended limit")
                }
            };
            Some(ConcentrationAlert {
                asset_class: class.to_string(),
                share_pct,
                level,
                message,
            })
        })
        .collect()
}
