//! Axum router and all HTTP handlers for tkd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests
//! in `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use tkd_schemas::PortfolioSnapshot;

use crate::{
    api_types::{
        ErrorResponse, FillsResponse, HealthResponse, OrdersResponse, PortfolioResponse,
        PositionResponse, PositionsResponse,
    },
    state::AppState,
};

/// How many orders `GET /v1/orders` returns at most.
const ORDERS_QUERY_LIMIT: i64 = 200;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/portfolio", get(portfolio))
        .route("/v1/positions", get(positions))
        .route("/v1/positions/:symbol", get(position_by_symbol))
        .route("/v1/orders", get(orders))
        .route("/v1/fills/:order_id", get(fills_by_order))
        .route("/v1/stream", get(stream))
        .with_state(state)
}

fn persistence_disabled() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "persistence disabled; set DB_URL to enable order history".to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            uptime_secs: st.uptime_secs(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/portfolio
// ---------------------------------------------------------------------------

pub(crate) async fn portfolio(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = st.view.snapshot(Utc::now());
    (StatusCode::OK, Json(PortfolioResponse { snapshot }))
}

// ---------------------------------------------------------------------------
// GET /v1/positions  /v1/positions/:symbol
// ---------------------------------------------------------------------------

pub(crate) async fn positions(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(PositionsResponse {
            positions: st.view.positions(),
        }),
    )
}

pub(crate) async fn position_by_symbol(
    State(st): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Response {
    match st.view.position(&symbol) {
        Some(position) => (StatusCode::OK, Json(PositionResponse { position })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no position for symbol {symbol}"),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/orders  (from persistence)
// ---------------------------------------------------------------------------

pub(crate) async fn orders(State(st): State<Arc<AppState>>) -> Response {
    let Some(pool) = &st.pool else {
        return persistence_disabled();
    };

    match tkd_db::fetch_orders(pool, ORDERS_QUERY_LIMIT).await {
        Ok(orders) => (StatusCode::OK, Json(OrdersResponse { orders })).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("order query failed: {err}"),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/fills/:order_id  (from persistence)
// ---------------------------------------------------------------------------

pub(crate) async fn fills_by_order(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Response {
    let Some(pool) = &st.pool else {
        return persistence_disabled();
    };

    match tkd_db::fetch_fills_for_order(pool, order_id).await {
        Ok(fills) => (StatusCode::OK, Json(FillsResponse { fills })).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("fill query failed: {err}"),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE: 1 Hz portfolio snapshots)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.snapshots.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<PortfolioSnapshot>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(snapshot) => {
                let data = serde_json::to_string(&snapshot).ok()?;
                Some(Ok(Event::default().event("snapshot").data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
