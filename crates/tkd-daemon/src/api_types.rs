//! Response types for all tkd-daemon HTTP endpoints.
//!
//! These types are `Serialize` so Axum can JSON-encode them and the scenario
//! tests can decode them.  Monetary fields ride on `Micros`, which
//! serializes as a scale-6 decimal string.  No business logic lives here.

use serde::{Deserialize, Serialize};

use tkd_db::{FillRow, OrderRow};
use tkd_schemas::{PortfolioSnapshot, Position};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// Error body (404 / 500 / 503)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// /v1/portfolio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioResponse {
    pub snapshot: PortfolioSnapshot,
}

// ---------------------------------------------------------------------------
// /v1/positions  /v1/positions/:symbol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PositionsResponse {
    pub positions: Vec<Position>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionResponse {
    pub position: Position,
}

// ---------------------------------------------------------------------------
// /v1/orders  /v1/fills/:order_id
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<OrderRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FillsResponse {
    pub fills: Vec<FillRow>,
}
