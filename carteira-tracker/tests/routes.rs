//! HTTP surface tests: router built over a static provider and a
//! temporary SQLite database.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use carteira_common::config::Config;
use carteira_tracker::data::{LocalStorage, Lookback, MarketDataProvider, ProviderError};
use carteira_tracker::valuation::{DividendEvent, DividendSeries, PriceSeries};
use carteira_tracker::{build_router, AppState};

// ============================================================================
// Fixtures
// ============================================================================

/// Serves fixed closes per ticker; unknown tickers are not found.
struct StaticProvider {
    closes: HashMap<String, Vec<f64>>,
    dividends: HashMap<String, Vec<f64>>,
}

impl StaticProvider {
    fn new() -> Self {
        let closes = HashMap::from([
            ("PETR4".to_string(), vec![40.0; 300]),
            ("HGLG11".to_string(), vec![160.0; 300]),
            ("TESOURO11".to_string(), Vec::new()),
        ]);
        let dividends = HashMap::from([
            ("PETR4".to_string(), vec![0.5; 12]),
            ("TESOURO11".to_string(), vec![0.5; 12]),
        ]);
        Self { closes, dividends }
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
    }
}

#[async_trait]
impl MarketDataProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn get_price_history(
        &self,
        ticker: &str,
        _lookback: Lookback,
    ) -> Result<PriceSeries, ProviderError> {
        self.closes
            .get(ticker)
            .map(|closes| PriceSeries::from_closes(Self::start(), closes))
            .ok_or_else(|| ProviderError::DataNotAvailable(ticker.to_string()))
    }

    async fn get_dividend_history(&self, ticker: &str) -> Result<DividendSeries, ProviderError> {
        let events = self
            .dividends
            .get(ticker)
            .map(|amounts| {
                Self::start()
                    .iter_days()
                    .step_by(30)
                    .zip(amounts)
                    .map(|(date, &amount)| DividendEvent::new(date, amount))
                    .collect()
            })
            .unwrap_or_default();
        Ok(DividendSeries::new(events))
    }
}

struct TestApp {
    router: Router,
    _dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path().join("carteira.db")).unwrap();
        let state = AppState::with_components(
            Config::default(),
            Arc::new(StaticProvider::new()),
            Some(Arc::new(storage)),
        );
        Self {
            router: build_router(Arc::new(state)),
            _dir: dir,
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

// ============================================================================
// Market Routes
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["provider"], "static");
    assert_eq!(body["storage_enabled"], true);
}

#[tokio::test]
async fn test_valuation_routes() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/api/v1/valuation/petr4", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticker"], "PETR4");
    assert_eq!(body["result"]["category"], "FAIR");
    assert_eq!(body["result"]["score"], 0);

    let (status, _) = app.send("GET", "/api/v1/valuation/X", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("GET", "/api/v1/valuation/PETR4?lookback=7y", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.send("GET", "/api/v1/valuation/ABCD3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ABCD3"));
}

#[tokio::test]
async fn test_ceiling_routes() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/api/v1/ceiling/PETR4", None).await;
    assert_eq!(status, StatusCode::OK);
    let ceiling = body["outcome"]["ceiling"]["ceiling_price"].as_f64().unwrap();
    assert!((ceiling - 100.0 / 3.0).abs() < 1e-6);

    let (status, _) = app
        .send("GET", "/api/v1/ceiling/PETR4?desired_yield=-0.05", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Dividends without a price never produce a directive
    let (status, body) = app.send("GET", "/api/v1/ceiling/TESOURO11", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["status"], "no_price_data");
    assert!(body["outcome"]["ceiling"].is_null());
}

#[tokio::test]
async fn test_screener_route() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            "POST",
            "/api/v1/screener",
            Some(json!({ "tickers": ["PETR4", "ABCD3"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"].as_array().unwrap().len(), 2);
    assert_eq!(body["failures"], 1);

    let (status, _) = app
        .send("POST", "/api/v1/screener", Some(json!({ "tickers": [] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Portfolio Routes
// ============================================================================

#[tokio::test]
async fn test_holding_lifecycle() {
    let app = TestApp::new();
    let holding = json!({
        "ticker": "petr4",
        "quantity": 100.0,
        "avg_cost": 30.0,
        "asset_class": "Acoes"
    });

    let (status, body) = app
        .send("POST", "/api/v1/users/ana/holdings", Some(holding))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ticker"], "PETR4");

    let (status, body) = app.send("GET", "/api/v1/users/ana/holdings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let update = json!({ "quantity": 50.0, "avg_cost": 32.0, "asset_class": "Acoes" });
    let (status, _) = app
        .send("PUT", "/api/v1/users/ana/holdings/VALE3", Some(update.clone()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send("PUT", "/api/v1/users/ana/holdings/PETR4", Some(update))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 50.0);

    let bad = json!({ "ticker": "PETR4", "quantity": -1.0, "avg_cost": 30.0, "asset_class": "Acoes" });
    let (status, _) = app
        .send("POST", "/api/v1/users/ana/holdings", Some(bad))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("DELETE", "/api/v1/users/ana/holdings/PETR4", None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send("DELETE", "/api/v1/users/ana/holdings/PETR4", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_targets_summary_and_rebalance() {
    let app = TestApp::new();

    let (status, _) = app
        .send("POST", "/api/v1/users/bia/rebalance", Some(json!({ "new_capital": 1000.0 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "PUT",
            "/api/v1/users/bia/targets",
            Some(json!([{ "asset_class": "Acoes", "target_pct": 150.0 }])),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let targets = json!([
        { "asset_class": "Acoes", "target_pct": 50.0 },
        { "asset_class": "FIIs", "target_pct": 50.0 }
    ]);
    let (status, body) = app
        .send("PUT", "/api/v1/users/bia/targets", Some(targets))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_pct"], 100.0);

    for (ticker, quantity, class) in [("PETR4", 15.0, "Acoes"), ("HGLG11", 2.5, "FIIs")] {
        let holding = json!({
            "ticker": ticker,
            "quantity": quantity,
            "avg_cost": 10.0,
            "asset_class": class
        });
        let (status, _) = app
            .send("POST", "/api/v1/users/bia/holdings", Some(holding))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // Market values: Acoes 15 x 40 = 600, FIIs 2.5 x 160 = 400
    let (status, body) = app.send("GET", "/api/v1/users/bia/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total_value"], 1000.0);
    assert_eq!(body["alerts"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .send("POST", "/api/v1/users/bia/rebalance", Some(json!({ "new_capital": 0.0 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let directives = body["directives"].as_array().unwrap();
    assert_eq!(directives.len(), 2);
    assert_eq!(directives[0]["asset_class"], "Acoes");
    assert_eq!(directives[0]["action"], "SELL");
    assert_eq!(directives[1]["action"], "BUY");
    assert!((directives[1]["gap"].as_f64().unwrap() - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_target_classes_match_holdings_after_trim() {
    let app = TestApp::new();

    let targets = json!([{ "asset_class": " Acoes ", "target_pct": 100.0 }]);
    let (status, body) = app
        .send("PUT", "/api/v1/users/caio/targets", Some(targets))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["targets"][0]["asset_class"], "Acoes");

    let holding = json!({ "ticker": "PETR4", "quantity": 10.0, "avg_cost": 30.0, "asset_class": "Acoes" });
    let (status, _) = app
        .send("POST", "/api/v1/users/caio/holdings", Some(holding))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send("POST", "/api/v1/users/caio/rebalance", Some(json!({ "new_capital": 0.0 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    // 10 x 40 already held in the only target class
    assert_eq!(body["directives"][0]["current_value"], 400.0);
    assert_eq!(body["directives"][0]["action"], "HOLD");
}

#[tokio::test]
async fn test_user_routes_without_storage() {
    let state = AppState::with_components(Config::default(), Arc::new(StaticProvider::new()), None);
    let router = build_router(Arc::new(state));

    let request = Request::builder()
        .uri("/api/v1/users/ana/holdings")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_invalid_user_id() {
    let app = TestApp::new();
    let (status, body) = app
        .send("GET", "/api/v1/users/bad%20user/holdings", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
