//! Configuration management for Carteira services.
//!
//! The service reads a single configuration file at `~/.carteira/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (CARTEIRA_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `CARTEIRA_PORT` → network.port
//! - `CARTEIRA_BIND_ADDRESS` → network.bind
//! - `CARTEIRA_LOG_LEVEL` → observability.log_level
//! - `CARTEIRA_DB_PATH` → storage.db_path
//! - `CARTEIRA_MARKET_DATA_URL` → market_data.base_url

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".carteira"),
        |dirs| dirs.home_dir().join(".carteira"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address.
    /// Default: "127.0.0.1" (local only)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout for the HTTP surface (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Aliases: "level"
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    /// Aliases: "format"
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to exclude from logging.
    ///
    /// These modules will be set to `warn` level to reduce noise.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Market Data Configuration
// ============================================================================

/// Market data source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// Base URL of the Yahoo-compatible chart API
    #[serde(default = "default_market_data_url")]
    pub base_url: String,

    /// HTTP timeout for a single request (seconds)
    #[serde(default = "default_market_data_timeout")]
    pub timeout_secs: u64,

    /// TTL of cached price/dividend histories (seconds)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: i64,

    /// Lookback used when the caller does not specify one ("5y", "max", ...)
    #[serde(default = "default_lookback")]
    pub default_lookback: String,

    /// Suffix appended to exchange tickers ending in a digit (e.g. PETR4 → PETR4.SA)
    #[serde(default = "default_exchange_suffix")]
    pub exchange_suffix: String,

    /// Maximum number of tickers fetched concurrently by the screener
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_data_url(),
            timeout_secs: default_market_data_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            default_lookback: default_lookback(),
            exchange_suffix: default_exchange_suffix(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// Holdings storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database. Defaults to `~/.carteira/carteira.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Whether persistent storage is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            enabled: true,
        }
    }
}

impl StorageConfig {
    /// Effective database path.
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| config_dir().join("carteira.db"))
    }
}

// ============================================================================
// Valuation Configuration
// ============================================================================

/// Valuation scoring overrides.
///
/// Every field is optional; unset fields keep the scorer defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValuationConfig {
    /// Desired dividend yield for the Bazin ceiling price (fraction, e.g. 0.06)
    #[serde(default)]
    pub desired_yield: Option<f64>,

    /// Discount applied to the 12-month average for the ideal entry price (e.g. 0.9)
    #[serde(default)]
    pub entry_discount: Option<f64>,

    /// Highest score still classified as an opportunity
    #[serde(default)]
    pub opportunity_max: Option<i32>,

    /// Highest score still classified as cheap
    #[serde(default)]
    pub cheap_max: Option<i32>,

    /// Highest score still classified as fair
    #[serde(default)]
    pub fair_max: Option<i32>,

    /// Highest score still classified as caution
    #[serde(default)]
    pub caution_max: Option<i32>,
}

impl ValuationConfig {
    /// Effective Bazin desired yield.
    pub fn desired_yield(&self) -> f64 {
        self.desired_yield.unwrap_or(DEFAULT_DESIRED_YIELD)
    }

    /// Effective category upper bounds, in the order opportunity, cheap,
    /// fair, caution.
    pub fn category_cutoffs(&self) -> [i32; 4] {
        [
            self.opportunity_max.unwrap_or(DEFAULT_OPPORTUNITY_MAX),
            self.cheap_max.unwrap_or(DEFAULT_CHEAP_MAX),
            self.fair_max.unwrap_or(DEFAULT_FAIR_MAX),
            self.caution_max.unwrap_or(DEFAULT_CAUTION_MAX),
        ]
    }
}

/// Bazin method default: 6% yield.
pub const DEFAULT_DESIRED_YIELD: f64 = 0.06;

/// Default category upper bounds (scores at or below)
pub const DEFAULT_OPPORTUNITY_MAX: i32 = -40;
pub const DEFAULT_CHEAP_MAX: i32 = -20;
pub const DEFAULT_FAIR_MAX: i32 = 0;
pub const DEFAULT_CAUTION_MAX: i32 = 20;

// ============================================================================
// Planner Configuration
// ============================================================================

/// Rebalancing planner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Rescale target percentages so they sum to 100
    #[serde(default)]
    pub normalize_targets: bool,

    /// Gaps whose magnitude is at or below this amount are reported as HOLD
    #[serde(default)]
    pub hold_tolerance: f64,
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub network: NetworkConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Market data source
    #[serde(default)]
    pub market_data: MarketDataConfig,

    /// Holdings storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Valuation scoring overrides
    #[serde(default)]
    pub valuation: ValuationConfig,

    /// Rebalancing planner
    #[serde(default)]
    pub planner: PlannerSettings,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("CARTEIRA_PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }

        if let Ok(bind) = std::env::var("CARTEIRA_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Ok(level) = std::env::var("CARTEIRA_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(path) = std::env::var("CARTEIRA_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("CARTEIRA_MARKET_DATA_URL") {
            self.market_data.base_url = url;
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        self.save_to(&config_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Socket address string for the HTTP listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}

// Default value functions
fn default_bind_address() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    4480
}
fn default_request_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_market_data_url() -> String {
    "https://query1.finance.yahoo.com".into()
}
fn default_market_data_timeout() -> u64 {
    15
}
fn default_cache_ttl() -> i64 {
    3600 // one hour, matches the dashboard's history cache
}
fn default_lookback() -> String {
    "5y".into()
}
fn default_exchange_suffix() -> String {
    ".SA".into()
}
fn default_max_concurrency() -> usize {
    8
}
fn default_true() -> bool {
    true
}
