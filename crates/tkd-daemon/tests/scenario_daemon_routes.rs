//! In-process scenario tests for tkd-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test builds a trading runtime (no feed, no db), wraps it in
//! `AppState`, and drives the router via `tower::ServiceExt::oneshot` — no
//! network I/O required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot
use uuid::Uuid;

use tkd_config::AppConfig;
use tkd_daemon::{routes, state};
use tkd_runtime::TradingRuntime;
use tkd_schemas::{EventPayload, Fill, Micros, Side, Tick};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn idle_runtime() -> TradingRuntime {
    let mut cfg = AppConfig::defaults();
    cfg.use_synthetic_feed = false;
    cfg.feed_symbols = vec!["ACME".to_string()];
    TradingRuntime::build(&cfg, None)
}

/// Drive the router with a single GET and return (status, body json).
async fn get(
    runtime: &TradingRuntime,
    uri: &str,
) -> (StatusCode, serde_json::Value) {
    let st = state::AppState::new(runtime);
    let router = routes::build_router(st);
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("body is not valid JSON")
    };
    (status, json)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let runtime = idle_runtime();
    let (status, json) = get(&runtime, "/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "tkd-daemon");
    assert!(json["uptime_secs"].is_u64());
}

// ---------------------------------------------------------------------------
// GET /v1/portfolio
// ---------------------------------------------------------------------------

#[tokio::test]
async fn portfolio_reports_initial_cash_as_decimal_string() {
    let runtime = idle_runtime();
    let (status, json) = get(&runtime, "/v1/portfolio").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["snapshot"]["cash"], "100000.000000");
    assert_eq!(json["snapshot"]["total_equity"], "100000.000000");
    assert_eq!(json["snapshot"]["drawdown_pct"], 0.0);
}

// ---------------------------------------------------------------------------
// GET /v1/positions  /v1/positions/:symbol
// ---------------------------------------------------------------------------

#[tokio::test]
async fn positions_start_empty_and_unknown_symbol_is_404() {
    let runtime = idle_runtime();

    let (status, json) = get(&runtime, "/v1/positions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["positions"].as_array().unwrap().len(), 0);

    let (status, json) = get(&runtime, "/v1/positions/NOPE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("NOPE"));
}

#[tokio::test]
async fn filled_position_is_served_with_money_strings() {
    let runtime = idle_runtime();
    let bus = runtime.bus();

    bus.publish_payload(EventPayload::Fill(Fill {
        id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        symbol: "ACME".to_string(),
        side: Side::Buy,
        qty: 10,
        price: Micros::from_units(100),
        filled_at: Utc::now(),
    }))
    .await;
    bus.publish_payload(EventPayload::Tick(Tick {
        symbol: "ACME".to_string(),
        last: Micros::from_units(110),
        bid: Micros::ZERO,
        ask: Micros::ZERO,
        volume: 1,
        ts: Utc::now(),
    }))
    .await;

    let (status, json) = get(&runtime, "/v1/positions/ACME").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["position"]["qty"], 10);
    assert_eq!(json["position"]["avg_entry_price"], "100.000000");
    assert_eq!(json["position"]["unrealized_pnl"], "100.000000");
    assert_eq!(json["position"]["last_mark"], "110.000000");

    let (status, json) = get(&runtime, "/v1/positions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["positions"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Persistence-backed endpoints without persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orders_and_fills_refuse_politely_without_db() {
    let runtime = idle_runtime();

    let (status, json) = get(&runtime, "/v1/orders").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().unwrap().contains("persistence"));

    let order_id = Uuid::new_v4();
    let (status, _) = get(&runtime, &format!("/v1/fills/{order_id}")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ---------------------------------------------------------------------------
// Unknown routes return 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let runtime = idle_runtime();
    let (status, _) = get(&runtime, "/v1/does_not_exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
