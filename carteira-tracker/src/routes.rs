//! HTTP routes for the tracker service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use carteira_common::{Error, ResultExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::{CacheStats, LocalStorage, Lookback};
use crate::portfolio::{
    concentration_alerts, normalize_ticker, summarize, AllocationTargets, ClassDirective,
    ConcentrationAlert, Holding, HoldingBook, PortfolioSummary, RiskMetrics,
};
use crate::screener::{ScanEntry, ScanReport};
use crate::valuation::{BazinOutcome, MetricsOutcome, ValuationReport, ValuationResult};
use crate::AppState;

/// Most tickers accepted by a single screener request
const MAX_SCREENER_TICKERS: usize = 50;

/// Longest accepted user id
const MAX_USER_ID_LEN: usize = 64;

// ============================================================================
// Error Response
// ============================================================================

/// Error returned by handlers, rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if self.0.is_retryable() {
            tracing::warn!(error = %self.0, "Market data unavailable");
        } else if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn storage_error(err: anyhow::Error) -> ApiError {
    ApiError(Error::Storage(format!("{:#}", err)))
}

fn storage(state: &AppState) -> ApiResult<&LocalStorage> {
    state
        .storage
        .as_deref()
        .ok_or_else(|| ApiError(Error::StorageDisabled))
}

fn validate_user(user: &str) -> ApiResult<&str> {
    let valid = !user.is_empty()
        && user.len() <= MAX_USER_ID_LEN
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(user)
    } else {
        Err(ApiError(Error::InvalidInput(format!("invalid user id: {:?}", user))))
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub provider: String,
    pub storage_enabled: bool,
    pub cache: CacheStats,
}

#[derive(Debug, Deserialize)]
pub struct ValuationQuery {
    pub lookback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValuationResponse {
    pub ticker: String,
    pub lookback: Lookback,
    pub metrics: MetricsOutcome,
    pub result: ValuationResult,
    pub report: ValuationReport,
}

#[derive(Debug, Deserialize)]
pub struct CeilingQuery {
    pub desired_yield: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CeilingResponse {
    pub ticker: String,
    pub outcome: BazinOutcome,
}

#[derive(Debug, Serialize)]
pub struct RiskResponse {
    pub ticker: String,
    pub metrics: Option<RiskMetrics>,
}

#[derive(Debug, Deserialize)]
pub struct ScreenerRequest {
    pub tickers: Vec<String>,
    pub lookback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScreenerResponse {
    pub entries: Vec<ScanEntry>,
    pub opportunities: Vec<String>,
    pub failures: usize,
}

impl From<ScanReport> for ScreenerResponse {
    fn from(report: ScanReport) -> Self {
        let opportunities = report
            .opportunities()
            .iter()
            .map(|e| e.ticker.clone())
            .collect();
        let failures = report.failures();
        Self {
            entries: report.entries,
            opportunities,
            failures,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HoldingRequest {
    pub ticker: String,
    pub quantity: f64,
    pub avg_cost: f64,
    pub asset_class: String,
}

#[derive(Debug, Deserialize)]
pub struct HoldingUpdateRequest {
    pub quantity: f64,
    pub avg_cost: f64,
    pub asset_class: String,
}

#[derive(Debug, Serialize)]
pub struct HoldingsResponse {
    pub holdings: HoldingBook,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct TargetsResponse {
    pub targets: AllocationTargets,
    pub total_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: PortfolioSummary,
    pub alerts: Vec<ConcentrationAlert>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RebalanceRequest {
    #[serde(default)]
    pub new_capital: f64,
}

#[derive(Debug, Serialize)]
pub struct RebalanceResponse {
    pub total: f64,
    pub new_capital: f64,
    pub target_pct_total: f64,
    pub directives: Vec<ClassDirective>,
    pub missing_prices: Vec<String>,
}

fn parse_lookback(raw: Option<&str>) -> ApiResult<Option<Lookback>> {
    raw.map(|s| s.parse::<Lookback>().map_err(ApiError::from))
        .transpose()
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "carteira-tracker".to_string(),
        provider: state.history.provider_name().to_string(),
        storage_enabled: state.storage.is_some(),
        cache: state.history.cache().stats(),
    })
}

/// Score a ticker against its history
pub async fn get_valuation(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<ValuationQuery>,
) -> ApiResult<Json<ValuationResponse>> {
    let ticker = normalize_ticker(&ticker)?;
    let lookback = parse_lookback(query.lookback.as_deref())?;

    let valuation = state
        .history
        .evaluate(&ticker, lookback)
        .await
        .context(format!("valuation of {}", ticker))?;
    let report = ValuationReport::from_result(&ticker, &valuation.metrics, &valuation.result);

    Ok(Json(ValuationResponse {
        ticker: valuation.ticker,
        lookback: valuation.lookback,
        metrics: valuation.metrics,
        result: valuation.result,
        report,
    }))
}

/// Bazin ceiling price
pub async fn get_ceiling(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<CeilingQuery>,
) -> ApiResult<Json<CeilingResponse>> {
    let ticker = normalize_ticker(&ticker)?;
    let outcome = state.history.ceiling(&ticker, query.desired_yield).await?;

    if outcome == BazinOutcome::InvalidDesiredYield {
        return Err(ApiError(Error::InvalidInput(
            "desired_yield must be a positive number".into(),
        )));
    }

    Ok(Json(CeilingResponse { ticker, outcome }))
}

/// Risk metrics over the last year
pub async fn get_risk(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> ApiResult<Json<RiskResponse>> {
    let ticker = normalize_ticker(&ticker)?;
    let metrics = state
        .history
        .risk(&ticker)
        .await
        .context(format!("risk metrics of {}", ticker))?;
    Ok(Json(RiskResponse { ticker, metrics }))
}

/// Scan a watchlist
pub async fn run_screener(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScreenerRequest>,
) -> ApiResult<Json<ScreenerResponse>> {
    if request.tickers.is_empty() || request.tickers.len() > MAX_SCREENER_TICKERS {
        return Err(ApiError(Error::InvalidInput(format!(
            "tickers must contain between 1 and {} symbols",
            MAX_SCREENER_TICKERS
        ))));
    }

    let report = match parse_lookback(request.lookback.as_deref())? {
        Some(lookback) => {
            state
                .scanner()
                .with_lookback(lookback)
                .scan(&request.tickers)
                .await
        }
        None => state.scanner().scan(&request.tickers).await,
    };

    Ok(Json(report.into()))
}

// ============================================================================
// Holdings Routes
// ============================================================================

/// List a user's holdings
pub async fn list_holdings(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> ApiResult<Json<HoldingsResponse>> {
    let user = validate_user(&user)?;
    let holdings = storage(&state)?
        .load_holdings(user)
        .await
        .map_err(storage_error)?;
    let count = holdings.len();

    Ok(Json(HoldingsResponse { holdings, count }))
}

/// Add a holding (merged into an existing position of the same ticker)
pub async fn add_holding(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(request): Json<HoldingRequest>,
) -> ApiResult<(StatusCode, Json<Holding>)> {
    let user = validate_user(&user)?;
    let holding = Holding::new(
        &request.ticker,
        request.quantity,
        request.avg_cost,
        &request.asset_class,
    )?;

    let stored = storage(&state)?
        .add_holding(user, holding)
        .await
        .map_err(storage_error)?;

    tracing::info!(user, ticker = %stored.ticker, "Holding added");
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Replace a holding
pub async fn update_holding(
    State(state): State<Arc<AppState>>,
    Path((user, ticker)): Path<(String, String)>,
    Json(request): Json<HoldingUpdateRequest>,
) -> ApiResult<Json<Holding>> {
    let user = validate_user(&user)?;
    let holding = Holding::new(
        &ticker,
        request.quantity,
        request.avg_cost,
        &request.asset_class,
    )?;

    let updated = storage(&state)?
        .update_holding(user, &holding)
        .await
        .map_err(storage_error)?;

    if !updated {
        return Err(ApiError(Error::NotFound(format!("holding {}", holding.ticker))));
    }
    Ok(Json(holding))
}

/// Delete a holding
pub async fn delete_holding(
    State(state): State<Arc<AppState>>,
    Path((user, ticker)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let user = validate_user(&user)?;
    let ticker = normalize_ticker(&ticker)?;

    let removed = storage(&state)?
        .remove_holding(user, &ticker)
        .await
        .map_err(storage_error)?;

    if !removed {
        return Err(ApiError(Error::NotFound(format!("holding {}", ticker))));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Targets / Planning Routes
// ============================================================================

/// Get a user's allocation targets
pub async fn get_targets(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> ApiResult<Json<TargetsResponse>> {
    let user = validate_user(&user)?;
    let targets = storage(&state)?
        .load_targets(user)
        .await
        .map_err(storage_error)?;
    let total_pct = targets.total_pct();

    Ok(Json(TargetsResponse { targets, total_pct }))
}

/// Replace a user's allocation targets
pub async fn put_targets(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(targets): Json<AllocationTargets>,
) -> ApiResult<Json<TargetsResponse>> {
    let user = validate_user(&user)?;

    for target in targets.iter() {
        if target.asset_class.trim().is_empty() {
            return Err(ApiError(Error::InvalidInput("asset class must not be empty".into())));
        }
        if !(0.0..=100.0).contains(&target.target_pct) {
            return Err(ApiError(Error::InvalidInput(format!(
                "target for {} must be between 0 and 100",
                target.asset_class
            ))));
        }
    }

    storage(&state)?
        .save_targets(user, &targets)
        .await
        .map_err(storage_error)?;

    let total_pct = targets.total_pct();
    if !targets.is_empty() && (total_pct - 100.0).abs() > 1e-6 {
        tracing::warn!(user, total_pct, "Allocation targets do not sum to 100%");
    }

    Ok(Json(TargetsResponse { targets, total_pct }))
}

/// Holdings at market prices plus concentration alerts
async fn load_summary(state: &AppState, user: &str) -> ApiResult<PortfolioSummary> {
    let book = storage(state)?
        .load_holdings(user)
        .await
        .map_err(storage_error)?;
    let prices = state.history.latest_prices(&book.tickers()).await;
    Ok(summarize(&book, &prices))
}

/// Portfolio summary
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> ApiResult<Json<SummaryResponse>> {
    let user = validate_user(&user)?;
    let summary = load_summary(&state, user).await?;
    let alerts = concentration_alerts(&summary.value_by_class);

    Ok(Json(SummaryResponse { summary, alerts }))
}

/// Rebalancing directives for a new contribution
pub async fn rebalance(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(request): Json<RebalanceRequest>,
) -> ApiResult<Json<RebalanceResponse>> {
    let user = validate_user(&user)?;
    if !request.new_capital.is_finite() {
        return Err(ApiError(Error::InvalidInput("new_capital must be a number".into())));
    }

    let targets = storage(&state)?
        .load_targets(user)
        .await
        .map_err(storage_error)?;
    if targets.is_empty() {
        return Err(ApiError(Error::NotFound(format!(
            "no allocation targets defined for {}",
            user
        ))));
    }

    let summary = load_summary(&state, user).await?;
    let new_capital = request.new_capital.max(0.0);
    let directives = state
        .planner
        .plan(&summary.value_by_class, &targets, request.new_capital);

    Ok(Json(RebalanceResponse {
        total: summary.total_value + new_capital,
        new_capital,
        target_pct_total: targets.total_pct(),
        directives,
        missing_prices: summary.missing_prices,
    }))
}
