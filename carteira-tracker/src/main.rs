//! Carteira Tracker - portfolio valuation and rebalancing service.
//!
//! Scores tickers against their own price history and plans contributions
//! toward target allocations.

use anyhow::Result;
use carteira_common::config::Config;
use carteira_common::logging::init_from_config;
use carteira_tracker::TrackerService;

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    // Load and validate configuration
    let config = Config::load_and_validate()?;

    init_from_config(&config.observability);

    tracing::info!("Carteira Tracker v{}", env!("CARGO_PKG_VERSION"));

    let service = TrackerService::new(config)?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
