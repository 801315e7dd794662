//! Persistence (§10.5): an optional record of terminal outcomes, written
//! fire-and-forget so a slow database never blocks the pipeline. Grounded
//! on the `sqlx::PgPool` usage in `rust-modules/src/data_pipeline/mod.rs`.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::warn;

use crate::notify::OutcomeEvent;

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record(&self, event: &OutcomeEvent);
}

/// Default sink when `persistence.enabled = false`.
pub struct NoopSink;

#[async_trait]
impl PersistenceSink for NoopSink {
    async fn record(&self, _event: &OutcomeEvent) {}
}

pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS opportunity_outcomes (
                id BIGSERIAL PRIMARY KEY,
                event_id UUID NOT NULL UNIQUE,
                opportunity_id TEXT NOT NULL,
                success BOOLEAN NOT NULL,
                profit_lamports BIGINT NOT NULL,
                signatures TEXT NOT NULL,
                error TEXT,
                resolved_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl PersistenceSink for PostgresSink {
    async fn record(&self, event: &OutcomeEvent) {
        let signatures = event.signatures.join(",");
        let result = sqlx::query(
            "INSERT INTO opportunity_outcomes
                (event_id, opportunity_id, success, profit_lamports, signatures, error, resolved_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event.event_id)
        .bind(&event.opportunity_id)
        .bind(event.success)
        .bind(event.profit_lamports as i64)
        .bind(&signatures)
        .bind(&event.error)
        .bind(event.resolved_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "failed to persist opportunity outcome");
        }
    }
}
