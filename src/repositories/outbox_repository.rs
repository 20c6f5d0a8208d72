use crate::error::{AppError, Result};
use crate::models::OutboxEvent;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, payload, occurred_at, \
     created_at, published_at, attempt_count, last_error";

/// Persistence for the transactional outbox. Appends happen inside the same
/// transaction as the business change; the processor locks batches with
/// SKIP LOCKED and updates them inside that same polling transaction.
#[derive(Clone)]
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        event: &OutboxEvent,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, aggregate_type, aggregate_id, event_type, payload,
                occurred_at, created_at, published_at, attempt_count, last_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.occurred_at)
        .bind(event.created_at)
        .bind(event.published_at)
        .bind(event.attempt_count)
        .bind(&event.last_error)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Locks a batch of unpublished events for this worker. The row locks
    /// live until the surrounding transaction ends, so markPublished and
    /// markFailed must run in the same transaction.
    pub async fn lock_unpublished_batch(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxEvent>(&format!(
            r#"
            SELECT {}
            FROM outbox_events
            WHERE published_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
            COLUMNS
        ))
        .bind(limit)
        .fetch_all(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn mark_published(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
    ) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET published_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn mark_failed(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempt_count = attempt_count + 1, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Operator tooling: puts dead-lettered events back on the queue by
    /// resetting their attempt counter and error.
    pub async fn requeue_dead_letters(&self, max_attempts: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempt_count = 0, last_error = NULL
            WHERE published_at IS NULL AND attempt_count >= $1
            "#,
        )
        .bind(max_attempts)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    pub async fn count_unpublished(&self) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM outbox_events WHERE published_at IS NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::Database)?;

        Ok(row.0)
    }

    pub async fn find_by_aggregate(&self, aggregate_id: Uuid) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxEvent>(&format!(
            r#"
            SELECT {}
            FROM outbox_events
            WHERE aggregate_id = $1
            ORDER BY created_at ASC
            "#,
            COLUMNS
        ))
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
