use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::Snapshot;
use crate::publish::SnapshotPublisher;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Durable store for published snapshots. The newest row is the one the
/// dashboard serves.
pub struct PgSnapshotPublisher {
    pool: PgPool,
}

impl PgSnapshotPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotPublisher for PgSnapshotPublisher {
    fn target(&self) -> String {
        "postgres:dashboard.snapshots".to_string()
    }

    async fn publish(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let body = serde_json::to_value(snapshot).context("failed to serialize snapshot")?;
        let total = i64::try_from(snapshot.metadados.total_registros)
            .context("record count does not fit in BIGINT")?;

        sqlx::query(
            r#"
            INSERT INTO dashboard.snapshots
            (id, generated_at, total_registros, meses, body)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(snapshot.metadados.data_atualizacao)
        .bind(total)
        .bind(&snapshot.metadados.meses_disponiveis)
        .bind(sqlx::types::Json(&body))
        .execute(&self.pool)
        .await
        .context("failed to store snapshot")?;

        Ok(())
    }
}

pub async fn latest_snapshot(pool: &PgPool) -> anyhow::Result<Option<serde_json::Value>> {
    let row = sqlx::query(
        "SELECT body FROM dashboard.snapshots \
         ORDER BY published_at DESC, generated_at DESC \
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await
    .context("failed to load latest snapshot")?;

    row.map(|row| row.try_get::<serde_json::Value, _>("body"))
        .transpose()
        .context("snapshot body is not valid JSON")
}
