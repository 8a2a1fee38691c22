//! Shared runtime state for tkd-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself — everything here is a cloneable handle into the
//! trading runtime.

use std::sync::Arc;
use std::time::Instant;

use sqlx::PgPool;
use tokio::sync::broadcast;

use tkd_portfolio::PortfolioView;
use tkd_runtime::TradingRuntime;
use tkd_schemas::PortfolioSnapshot;

/// Static build metadata included in health responses.
#[derive(Clone, Copy, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub build: BuildInfo,
    /// When this state was built; `main` builds it once at daemon start.
    started: Instant,
    /// Read-only view into live positions and cash.
    pub view: PortfolioView,
    /// Persistence, when configured; endpoints backed by it refuse politely
    /// otherwise.
    pub pool: Option<PgPool>,
    /// The runtime's 1 Hz snapshot channel, re-broadcast over SSE.
    pub snapshots: broadcast::Sender<PortfolioSnapshot>,
}

impl AppState {
    pub fn new(runtime: &TradingRuntime) -> Arc<Self> {
        Arc::new(Self {
            build: BuildInfo {
                service: "tkd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            started: Instant::now(),
            view: runtime.view(),
            pool: runtime.pool(),
            snapshots: runtime.snapshots(),
        })
    }

    /// Whole seconds since the daemon came up.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
