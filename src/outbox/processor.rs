use crate::config::OutboxSettings;
use crate::error::{AppError, Result};
use crate::observability::get_metrics;
use crate::outbox::publisher::EventPublisher;
use crate::repositories::OutboxRepository;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// Polls unpublished outbox events and dispatches them. The SKIP LOCKED
/// select and every markPublished/markFailed update share one transaction;
/// the row locks would evaporate right after the SELECT otherwise, and two
/// workers would dispatch the same event.
pub struct OutboxProcessor {
    pool: PgPool,
    outbox: OutboxRepository,
    publisher: Arc<dyn EventPublisher>,
    settings: OutboxSettings,
}

impl OutboxProcessor {
    pub fn new(pool: PgPool, publisher: Arc<dyn EventPublisher>, settings: OutboxSettings) -> Self {
        Self {
            outbox: OutboxRepository::new(pool.clone()),
            pool,
            publisher,
            settings,
        }
    }

    /// One polling pass. A failure of mark_failed itself aborts the whole
    /// batch so no attempt counter is lost; the batch is retried next tick.
    pub async fn run_once(&self) -> Result<BatchStats> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let batch = self
            .outbox
            .lock_unpublished_batch(&mut tx, self.settings.batch_size)
            .await?;

        let mut stats = BatchStats::default();
        for event in &batch {
            if event.attempt_count >= self.settings.max_attempts {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    aggregate_id = %event.aggregate_id,
                    attempt_count = event.attempt_count,
                    last_error = ?event.last_error,
                    "CRITICAL: outbox event dead-lettered; requeue via operator tooling"
                );
                get_metrics().record_outbox_dead_letter();
                stats.dead_lettered += 1;
                continue;
            }

            match self.publisher.publish(event).await {
                Ok(()) => {
                    self.outbox.mark_published(&mut tx, event.id).await?;
                    get_metrics().record_outbox_published();
                    stats.published += 1;
                }
                Err(err) => {
                    self.outbox
                        .mark_failed(&mut tx, event.id, &err.to_string())
                        .await?;
                    get_metrics().record_outbox_failed();
                    stats.failed += 1;
                }
            }
        }

        tx.commit().await.map_err(AppError::Database)?;
        if stats != BatchStats::default() {
            debug!(?stats, "outbox batch processed");
        }
        Ok(stats)
    }

    /// Resets dead-lettered events so the poll loop picks them up again.
    pub async fn requeue_dead_letters(&self) -> Result<u64> {
        self.outbox.requeue_dead_letters(self.settings.max_attempts).await
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        info!(
            poll_interval_ms = self.settings.poll_interval_ms,
            batch_size = self.settings.batch_size,
            "outbox processor started"
        );
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(self.settings.poll_interval_ms));
            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(_) => {
                        if let Ok(backlog) = self.outbox.count_unpublished().await {
                            get_metrics().set_outbox_unpublished(backlog);
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "outbox polling pass failed");
                    }
                }
            }
        })
    }
}
