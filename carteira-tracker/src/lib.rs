//! Carteira Tracker Library
//!
//! Portfolio tracking for Brazilian retail investors: scores tickers
//! against their own price history and plans contributions toward target
//! allocations per asset class.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                  carteira-tracker (Rust Service)                    │
//! │                           :4480                                     │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐      │
//! │  │  Market Data    │  │  Valuation      │  │  Portfolio      │      │
//! │  │  Yahoo + Cache  │  │  Scorer         │  │  Planner        │      │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘      │
//! │  ┌─────────────────┐  ┌─────────────────┐                           │
//! │  │  Screener       │  │  Local Storage  │                           │
//! │  │  (watchlists)   │  │  (SQLite)       │                           │
//! │  └─────────────────┘  └─────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Historical valuation
//! - Compare the last close with the 12-month average, the 20/80
//!   percentiles, the historical range and the change over the last year
//! - Signed score mapped to Opportunity / Cheap / Fair / Caution / Expensive
//! - Bazin ceiling price from the estimated annual dividend
//!
//! ## Rebalancing
//! - Holdings grouped by asset class, target percentage per class
//! - New contribution distributed as BUY/SELL/HOLD gaps per class

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod portfolio;
pub mod routes;
pub mod screener;
pub mod valuation;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post, put},
    Router,
};
use carteira_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::data::{HistoryCache, HistoryService, LocalStorage, Lookback, MarketDataProvider, YahooFinanceProvider};
use crate::portfolio::{PlannerConfig, RebalancingPlanner};
use crate::screener::WatchlistScanner;
use crate::valuation::ValuationScorer;

/// Tracker service state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Market history access (provider + cache + scorer)
    pub history: Arc<HistoryService>,
    /// Rebalancing planner
    pub planner: RebalancingPlanner,
    /// Holdings/targets storage; `None` when disabled
    pub storage: Option<Arc<LocalStorage>>,
}

impl AppState {
    /// Create the state with the Yahoo provider and the configured storage
    pub fn new(config: Config) -> Result<Self> {
        let provider: Arc<dyn MarketDataProvider> =
            Arc::new(YahooFinanceProvider::from_config(&config.market_data));

        let storage = if config.storage.enabled {
            let storage = LocalStorage::from_config(&config.storage)
                .context("Failed to open local storage")?;
            Some(Arc::new(storage))
        } else {
            tracing::warn!("Local storage disabled, user routes will be unavailable");
            None
        };

        Ok(Self::with_components(config, provider, storage))
    }

    /// Create the state from explicit collaborators
    pub fn with_components(
        config: Config,
        provider: Arc<dyn MarketDataProvider>,
        storage: Option<Arc<LocalStorage>>,
    ) -> Self {
        let cache = Arc::new(HistoryCache::with_ttl(config.market_data.cache_ttl_secs));

        let default_lookback = config
            .market_data
            .default_lookback
            .parse::<Lookback>()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to the 5y lookback");
                Lookback::default()
            });

        let history = HistoryService::new(provider, cache)
            .with_scorer(ValuationScorer::from_config(&config.valuation))
            .with_default_lookback(default_lookback)
            .with_concurrency(config.market_data.max_concurrency);

        let planner = RebalancingPlanner::with_config(PlannerConfig::from(&config.planner));

        Self {
            config,
            history: Arc::new(history),
            planner,
            storage,
        }
    }

    /// Watchlist scanner sharing this state's history service
    pub fn scanner(&self) -> WatchlistScanner {
        WatchlistScanner::new(Arc::clone(&self.history))
            .with_max_concurrency(self.config.market_data.max_concurrency)
    }
}

/// Build the HTTP router
pub fn build_router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.network.request_timeout_secs);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/valuation/:ticker", get(routes::get_valuation))
        .route("/api/v1/ceiling/:ticker", get(routes::get_ceiling))
        .route("/api/v1/risk/:ticker", get(routes::get_risk))
        .route("/api/v1/screener", post(routes::run_screener))
        // User portfolio routes
        .route(
            "/api/v1/users/:user/holdings",
            get(routes::list_holdings).post(routes::add_holding),
        )
        .route(
            "/api/v1/users/:user/holdings/:ticker",
            put(routes::update_holding).delete(routes::delete_holding),
        )
        .route(
            "/api/v1/users/:user/targets",
            get(routes::get_targets).put(routes::put_targets),
        )
        .route("/api/v1/users/:user/summary", get(routes::get_summary))
        .route("/api/v1/users/:user/rebalance", post(routes::rebalance))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Main tracker service
pub struct TrackerService {
    state: Arc<AppState>,
}

impl TrackerService {
    /// Create a new tracker service
    pub fn new(config: Config) -> Result<Self> {
        let state = Arc::new(AppState::new(config)?);
        Ok(Self { state })
    }

    /// Start the tracker service
    pub async fn start(self) -> Result<()> {
        let app = build_router(self.state.clone());

        // Periodically drop expired history entries
        let cache_state = self.state.clone();
        tokio::spawn(async move {
            run_cache_maintenance(cache_state).await;
        });

        let addr: SocketAddr = self
            .state
            .config
            .listen_address()
            .parse()
            .context("Invalid listen address")?;
        tracing::info!(address = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Clear expired cache entries once per TTL
async fn run_cache_maintenance(state: Arc<AppState>) {
    let period = Duration::from_secs(state.history.cache().ttl_secs().max(1) as u64);
    let mut interval = tokio::time::interval(period);
    // First tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        state.history.cache().clear_expired();
        let stats = state.history.cache().stats();
        tracing::debug!(active = stats.active_entries, "Cache maintenance done");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
