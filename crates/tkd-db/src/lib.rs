//! tkd-db
//!
//! PostgreSQL persistence: pool setup, embedded migrations, and an
//! idempotent repository (orders upsert by id, fills append-only, positions
//! upsert by symbol, snapshots append-only) plus the read queries the HTTP
//! layer serves.
//!
//! `Micros` converts to `numeric(18,6)` via `rust_decimal` at this boundary
//! only; nothing upstream touches `Decimal`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use tkd_schemas::{Fill, Micros, OrderRequest, OrderStatus, PortfolioSnapshot, Position};

mod sink;

pub use sink::PersistenceSink;

/// Connect to Postgres.
pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// `Micros` → `numeric(18,6)`.
pub fn micros_to_decimal(m: Micros) -> Decimal {
    Decimal::from_i128_with_scale(m.raw() as i128, 6)
}

fn qty_to_i32(qty: i64) -> Result<i32> {
    i32::try_from(qty).with_context(|| format!("quantity {qty} exceeds int column range"))
}

// ---------------------------------------------------------------------------
// Write surface
// ---------------------------------------------------------------------------

/// Insert an order or refresh its status (idempotent by id).
pub async fn upsert_order(pool: &PgPool, order: &OrderRequest) -> Result<()> {
    sqlx::query(
        r#"
        insert into orders (id, symbol, side, quantity, order_type, limit_price,
                            strategy_id, status, created_at)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        on conflict (id) do update set status = excluded.status
        "#,
    )
    .bind(order.id)
    .bind(&order.symbol)
    .bind(order.side.to_string())
    .bind(qty_to_i32(order.qty)?)
    .bind(order.order_type.to_string())
    .bind(order.limit_price.map(micros_to_decimal))
    .bind(&order.strategy_id)
    .bind(order.status.to_string())
    .bind(order.created_at)
    .execute(pool)
    .await
    .context("upsert_order failed")?;
    Ok(())
}

/// Update one order's status.  Unknown ids are a no-op (the status event may
/// have outrun a failed order insert).
pub async fn update_order_status(pool: &PgPool, order_id: Uuid, status: OrderStatus) -> Result<()> {
    sqlx::query("update orders set status = $2 where id = $1")
        .bind(order_id)
        .bind(status.to_string())
        .execute(pool)
        .await
        .context("update_order_status failed")?;
    Ok(())
}

/// Append one fill.
pub async fn insert_fill(pool: &PgPool, fill: &Fill) -> Result<()> {
    sqlx::query(
        r#"
        insert into fills (order_id, symbol, side, quantity, price, filled_at)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(fill.order_id)
    .bind(&fill.symbol)
    .bind(fill.side.to_string())
    .bind(qty_to_i32(fill.qty)?)
    .bind(micros_to_decimal(fill.price))
    .bind(fill.filled_at)
    .execute(pool)
    .await
    .context("insert_fill failed")?;
    Ok(())
}

/// Upsert one position row by symbol.
pub async fn upsert_position(
    pool: &PgPool,
    position: &Position,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into positions (symbol, quantity, avg_entry_price, realized_pnl, updated_at)
        values ($1, $2, $3, $4, $5)
        on conflict (symbol) do update set
            quantity = excluded.quantity,
            avg_entry_price = excluded.avg_entry_price,
            realized_pnl = excluded.realized_pnl,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&position.symbol)
    .bind(qty_to_i32(position.qty)?)
    .bind(micros_to_decimal(position.avg_entry_price))
    .bind(micros_to_decimal(position.realized_pnl))
    .bind(updated_at)
    .execute(pool)
    .await
    .context("upsert_position failed")?;
    Ok(())
}

/// Append one portfolio snapshot.
pub async fn insert_snapshot(pool: &PgPool, snapshot: &PortfolioSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        insert into portfolio_snapshots
            (total_equity, total_unrealized_pnl, total_realized_pnl, snapshot_at)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(micros_to_decimal(snapshot.total_equity))
    .bind(micros_to_decimal(snapshot.total_unrealized))
    .bind(micros_to_decimal(snapshot.total_realized))
    .bind(snapshot.snapshot_at)
    .execute(pool)
    .await
    .context("insert_snapshot failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read surface
// ---------------------------------------------------------------------------

/// One persisted order, money rendered as decimal strings.
#[derive(Clone, Debug, Serialize)]
pub struct OrderRow {
    pub id: Uuid,
    pub symbol: String,
    pub side: String,
    pub quantity: i32,
    pub order_type: String,
    pub limit_price: Option<String>,
    pub strategy_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// One persisted fill.
#[derive(Clone, Debug, Serialize)]
pub struct FillRow {
    pub id: i32,
    pub order_id: Uuid,
    pub symbol: String,
    pub side: String,
    pub quantity: i32,
    pub price: String,
    pub filled_at: DateTime<Utc>,
}

/// Most recent orders, newest first.
pub async fn fetch_orders(pool: &PgPool, limit: i64) -> Result<Vec<OrderRow>> {
    let rows = sqlx::query(
        r#"
        select id, symbol, side, quantity, order_type, limit_price,
               strategy_id, status, created_at
        from orders
        order by created_at desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch_orders failed")?;

    rows.iter()
        .map(|row| -> Result<OrderRow> {
            Ok(OrderRow {
                id: row.try_get("id")?,
                symbol: row.try_get("symbol")?,
                side: row.try_get("side")?,
                quantity: row.try_get("quantity")?,
                order_type: row.try_get("order_type")?,
                limit_price: row
                    .try_get::<Option<Decimal>, _>("limit_price")?
                    .map(|d| d.to_string()),
                strategy_id: row.try_get("strategy_id")?,
                status: row.try_get("status")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

/// All fills for one order, in fill order.
pub async fn fetch_fills_for_order(pool: &PgPool, order_id: Uuid) -> Result<Vec<FillRow>> {
    let rows = sqlx::query(
        r#"
        select id, order_id, symbol, side, quantity, price, filled_at
        from fills
        where order_id = $1
        order by id
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
    .context("fetch_fills_for_order failed")?;

    rows.iter()
        .map(|row| -> Result<FillRow> {
            Ok(FillRow {
                id: row.try_get("id")?,
                order_id: row.try_get("order_id")?,
                symbol: row.try_get("symbol")?,
                side: row.try_get("side")?,
                quantity: row.try_get("quantity")?,
                price: row.try_get::<Decimal, _>("price")?.to_string(),
                filled_at: row.try_get("filled_at")?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
