//! Persistence sink service.
//!
//! Subscribes to `ORDER_REQUEST`, `ORDER_UPDATE`, `FILL`, `POSITION_UPDATE`
//! and writes each through the repository.  Writes are best-effort: a
//! failure is logged with the event id and swallowed so the bus is never
//! blocked on the database.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use tkd_bus::EventHandler;
use tkd_schemas::{Event, EventPayload};

use crate::{insert_fill, update_order_status, upsert_order, upsert_position};

pub struct PersistenceSink {
    pool: PgPool,
}

impl PersistenceSink {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl EventHandler for PersistenceSink {
    fn name(&self) -> &str {
        "persistence-sink"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let result = match &event.payload {
            EventPayload::OrderRequest(order) => upsert_order(&self.pool, order).await,
            EventPayload::OrderUpdate(update) => {
                update_order_status(&self.pool, update.order_id, update.status).await
            }
            EventPayload::Fill(fill) => insert_fill(&self.pool, fill).await,
            EventPayload::PositionUpdate(position) => {
                upsert_position(&self.pool, position, event.ts).await
            }
            _ => Ok(()),
        };

        if let Err(err) = result {
            warn!(event_id = %event.event_id, kind = %event.kind(), error = %err,
                "best-effort persistence write failed");
        }
        Ok(())
    }
}
