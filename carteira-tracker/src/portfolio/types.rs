//! Portfolio Types.
//!
//! Holdings, the holding book and insertion-ordered per-class amounts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted ticker symbol.
const MAX_TICKER_LEN: usize = 12;

// ============================================================================
// Errors
// ============================================================================

/// Invalid holding data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HoldingError {
    #[error("invalid ticker: {0:?}")]
    InvalidTicker(String),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(f64),

    #[error("average cost must be positive, got {0}")]
    InvalidAverageCost(f64),

    #[error("asset class must not be empty")]
    EmptyAssetClass,

    #[error("holding not found: {0}")]
    NotFound(String),
}

impl From<HoldingError> for carteira_common::Error {
    fn from(err: HoldingError) -> Self {
        match err {
            HoldingError::NotFound(_) => Self::NotFound(err.to_string()),
            _ => Self::InvalidInput(err.to_string()),
        }
    }
}

/// Normalize a ticker symbol: trimmed, upper-case, 2-12 characters of
/// letters, digits, `.`, `-` or `^`.
pub fn normalize_ticker(raw: &str) -> Result<String, HoldingError> {
    let ticker = raw.trim().to_uppercase();
    let well_formed = (2..=MAX_TICKER_LEN).contains(&ticker.len())
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'));

    if well_formed {
        Ok(ticker)
    } else {
        Err(HoldingError::InvalidTicker(raw.to_string()))
    }
}

// ============================================================================
// Holding
// ============================================================================

/// A position in one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub quantity: f64,
    pub avg_cost: f64,
    pub asset_class: String,
}

impl Holding {
    /// Create a validated holding.
    pub fn new(
        ticker: &str,
        quantity: f64,
        avg_cost: f64,
        asset_class: &str,
    ) -> Result<Self, HoldingError> {
        let ticker = normalize_ticker(ticker)?;
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(HoldingError::InvalidQuantity(quantity));
        }
        if !(avg_cost.is_finite() && avg_cost > 0.0) {
            return Err(HoldingError::InvalidAverageCost(avg_cost));
        }
        let asset_class = asset_class.trim();
        if asset_class.is_empty() {
            return Err(HoldingError::EmptyAssetClass);
        }

        Ok(Self {
            ticker,
            quantity,
            avg_cost,
            asset_class: asset_class.to_string(),
        })
    }

    /// Amount paid for the position.
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.avg_cost
    }

    /// Market value at `price`.
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }
}

// ============================================================================
// Class Totals
// ============================================================================

/// Amount per asset class, kept in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassTotals {
    entries: Vec<(String, f64)>,
}

impl ClassTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to `class`, creating the entry when missing.
    pub fn add(&mut self, class: &str, amount: f64) {
        match self.entries.iter_mut().find(|(c, _)| c == class) {
            Some((_, value)) => *value += amount,
            None => self.entries.push((class.to_string(), amount)),
        }
    }

    pub fn get(&self, class: &str) -> Option<f64> {
        self.entries.iter().find(|(c, _)| c == class).map(|(_, v)| *v)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ClassTotals {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut totals = Self::new();
        for (class, amount) in iter {
            let class: String = class.into();
            totals.add(&class, amount);
        }
        totals
    }
}

// ============================================================================
// Allocation Targets
// ============================================================================

/// Target share of one asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAllocation {
    pub asset_class: String,
    /// Percentage, 0-100
    pub target_pct: f64,
}

/// Target percentage per asset class, in insertion order.
///
/// The sum is not enforced to be 100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TargetAllocation>", into = "Vec<TargetAllocation>")]
pub struct AllocationTargets {
    entries: Vec<TargetAllocation>,
}

impl AllocationTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target of `class` (trimmed, matching [`Holding`] classes).
    /// An existing class keeps its position.
    pub fn set(&mut self, class: &str, target_pct: f64) {
        let class = class.trim();
        match self.entries.iter_mut().find(|t| t.asset_class == class) {
            Some(existing) => existing.target_pct = target_pct,
            None => self.entries.push(TargetAllocation {
                asset_class: class.to_string(),
                target_pct,
            }),
        }
    }

    pub fn get(&self, class: &str) -> Option<f64> {
        let class = class.trim();
        self.entries
            .iter()
            .find(|t| t.asset_class == class)
            .map(|t| t.target_pct)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetAllocation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all target percentages.
    pub fn total_pct(&self) -> f64 {
        self.entries.iter().map(|t| t.target_pct).sum()
    }

    /// Copy rescaled so the percentages sum to 100. A zero sum is left as is.
    pub fn normalized(&self) -> Self {
        let total = self.total_pct();
        if total == 0.0 {
            return self.clone();
        }
        Self {
            entries: self
                .entries
                .iter()
                .map(|t| TargetAllocation {
                    asset_class: t.asset_class.clone(),
                    target_pct: t.target_pct / total * 100.0,
                })
                .collect(),
        }
    }
}

impl From<Vec<TargetAllocation>> for AllocationTargets {
    fn from(entries: Vec<TargetAllocation>) -> Self {
        let mut targets = Self::new();
        for entry in entries {
            targets.set(&entry.asset_class, entry.target_pct);
        }
        targets
    }
}

impl From<AllocationTargets> for Vec<TargetAllocation> {
    fn from(targets: AllocationTargets) -> Self {
        targets.entries
    }
}

impl<S: AsRef<str>> FromIterator<(S, f64)> for AllocationTargets {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut targets = Self::new();
        for (class, pct) in iter {
            targets.set(class.as_ref(), pct);
        }
        targets
    }
}

// ============================================================================
// Holding Book
// ============================================================================

/// A user's holdings, one entry per ticker, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldingBook {
    holdings: Vec<Holding>,
}

impl HoldingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a holding. A ticker already in the book is merged: quantities
    /// add up and the average cost becomes the quantity-weighted mean.
    /// The existing asset class is kept.
    pub fn add(&mut self, holding: Holding) -> &Holding {
        match self.position(&holding.ticker) {
            Some(idx) => {
                let existing = &mut self.holdings[idx];
                let quantity = existing.quantity + holding.quantity;
                existing.avg_cost =
                    (existing.cost_basis() + holding.cost_basis()) / quantity;
                existing.quantity = quantity;
                &self.holdings[idx]
            }
            None => {
                self.holdings.push(holding);
                &self.holdings[self.holdings.len() - 1]
            }
        }
    }

    /// Replace quantity, average cost and class of an existing ticker.
    pub fn update(&mut self, holding: Holding) -> Result<(), HoldingError> {
        let idx = self
            .position(&holding.ticker)
            .ok_or_else(|| HoldingError::NotFound(holding.ticker.clone()))?;
        self.holdings[idx] = holding;
        Ok(())
    }

    /// Remove a ticker, returning the removed holding.
    pub fn remove(&mut self, ticker: &str) -> Option<Holding> {
        let ticker = ticker.trim().to_uppercase();
        let idx = self.position(&ticker)?;
        Some(self.holdings.remove(idx))
    }

    pub fn get(&self, ticker: &str) -> Option<&Holding> {
        let ticker = ticker.trim().to_uppercase();
        self.holdings.iter().find(|h| h.ticker == ticker)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Holding> {
        self.holdings.iter()
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn tickers(&self) -> Vec<String> {
        self.holdings.iter().map(|h| h.ticker.clone()).collect()
    }

    /// Cost basis summed per asset class.
    pub fn cost_by_class(&self) -> ClassTotals {
        self.holdings
            .iter()
            .map(|h| (h.asset_class.as_str(), h.cost_basis()))
            .collect()
    }

    fn position(&self, ticker: &str) -> Option<usize> {
        self.holdings.iter().position(|h| h.ticker == ticker)
    }
}

impl From<Vec<Holding>> for HoldingBook {
    fn from(holdings: Vec<Holding>) -> Self {
        let mut book = Self::new();
        for holding in holdings {
            book.add(holding);
        }
        book
    }
}

// ============================================================================
// Tests
// ============================================================================
