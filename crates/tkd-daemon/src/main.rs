//! tkd-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads the config,
//! connects persistence when configured, builds and starts the trading
//! runtime, wires middleware, and serves HTTP until ctrl-c or a fatal
//! component error.  All route handlers live in `routes.rs`; all shared
//! state types live in `state.rs`.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tkd_config::AppConfig;
use tkd_daemon::{routes, state};
use tkd_runtime::TradingRuntime;
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};

/// Bounded drain for services on shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).  Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let cfg = AppConfig::from_env().context("load configuration")?;
    init_tracing(&cfg.log_level);
    info!(config_hash = %cfg.config_hash(), "tkd-daemon starting");

    let pool = match &cfg.db_url {
        Some(url) => {
            let pool = tkd_db::connect(url).await?;
            tkd_db::migrate(&pool).await?;
            info!("persistence connected and migrated");
            Some(pool)
        }
        None => {
            warn!("DB_URL not set; order/fill history endpoints disabled");
            None
        }
    };

    let mut runtime = TradingRuntime::build(&cfg, pool);
    runtime.start();

    let shared = state::AppState::new(&runtime);
    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let listener = tokio::net::TcpListener::bind(cfg.api_addr)
        .await
        .with_context(|| format!("bind {}", cfg.api_addr))?;
    info!("tkd-daemon listening on http://{}", cfg.api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(runtime.fatal()))
        .await
        .context("server crashed")?;

    runtime.shutdown(SHUTDOWN_DRAIN).await;
    Ok(())
}

/// Resolves on ctrl-c or when a component reports a fatal error.
async fn shutdown_signal(mut fatal: watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received; shutting down");
        }
        changed = fatal.changed() => {
            if changed.is_ok() && *fatal.borrow() {
                error!("fatal component error; shutting down");
            }
        }
    }
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .init();
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any)
}
