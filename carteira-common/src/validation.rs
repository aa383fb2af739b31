//! Configuration validation for Carteira services.
//!
//! Provides validation logic for configuration fields to ensure
//! all values are present and within valid ranges.

use thiserror::Error;

use crate::config::{
    Config, MarketDataConfig, NetworkConfig, ObservabilityConfig, PlannerSettings,
    ValuationConfig,
};

/// Lookback windows understood by the market data layer.
pub const VALID_LOOKBACKS: &[&str] = &["1d", "5d", "1mo", "6mo", "1y", "5y", "max"];

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.network.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.market_data.validate() {
            errors.push(e);
        }
        if let Err(e) = self.valuation.validate() {
            errors.push(e);
        }
        if let Err(e) = self.planner.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load (with env overrides) and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "network.port".into(),
            });
        }

        if self.bind.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "network.bind".into(),
            });
        }

        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "network.request_timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for MarketDataConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "market_data.base_url".into(),
            });
        }

        if !VALID_LOOKBACKS.contains(&self.default_lookback.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "market_data.default_lookback".into(),
                reason: format!("must be one of: {}", VALID_LOOKBACKS.join(", ")),
            });
        }

        if self.cache_ttl_secs <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "market_data.cache_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "market_data.max_concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ValuationConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(dy) = self.desired_yield {
            if !dy.is_finite() || dy <= 0.0 || dy >= 1.0 {
                return Err(ValidationError::InvalidValue {
                    field: "valuation.desired_yield".into(),
                    reason: "must be a fraction between 0 and 1 (e.g. 0.06)".into(),
                });
            }
        }

        if let Some(discount) = self.entry_discount {
            if !discount.is_finite() || discount <= 0.0 || discount > 1.0 {
                return Err(ValidationError::InvalidValue {
                    field: "valuation.entry_discount".into(),
                    reason: "must be in (0, 1]".into(),
                });
            }
        }

        // Effective cutoffs (defaults included) must be strictly ascending
        const NAMES: [&str; 4] = [
            "valuation.opportunity_max",
            "valuation.cheap_max",
            "valuation.fair_max",
            "valuation.caution_max",
        ];
        let cutoffs = self.category_cutoffs();
        for i in 1..cutoffs.len() {
            if cutoffs[i - 1] >= cutoffs[i] {
                return Err(ValidationError::InvalidValue {
                    field: NAMES[i].into(),
                    reason: format!(
                        "must be greater than {} ({})",
                        NAMES[i - 1],
                        cutoffs[i - 1]
                    ),
                });
            }
        }

        Ok(())
    }
}

impl Validate for PlannerSettings {
    fn validate(&self) -> ValidationResult<()> {
        if !self.hold_tolerance.is_finite() || self.hold_tolerance < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "planner.hold_tolerance".into(),
                reason: "must be a non-negative amount".into(),
            });
        }
        Ok(())
    }
}
