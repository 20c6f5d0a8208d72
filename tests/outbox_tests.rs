mod common;

use async_trait::async_trait;
use chrono::Utc;
use fund_transfer_engine::config::OutboxSettings;
use fund_transfer_engine::error::{AppError, Result};
use fund_transfer_engine::models::{DomainEvent, OutboxEvent};
use fund_transfer_engine::outbox::{EventPublisher, LoggingPublisher, OutboxProcessor};
use fund_transfer_engine::repositories::OutboxRepository;
use fund_transfer_engine::services::{InitiateTransferCommand, TransferService};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Fails every dispatch for one aggregate, succeeds for the rest.
struct FailingFor {
    aggregate_id: Uuid,
}

#[async_trait]
impl EventPublisher for FailingFor {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        if event.aggregate_id == self.aggregate_id {
            Err(AppError::Internal(anyhow::anyhow!("broker unavailable")))
        } else {
            Ok(())
        }
    }
}

fn settings() -> OutboxSettings {
    OutboxSettings {
        poll_interval_ms: 50,
        batch_size: 100,
        max_attempts: 5,
    }
}

async fn append_event(pool: &PgPool, aggregate_id: Uuid) -> OutboxEvent {
    let event = OutboxEvent::new(
        aggregate_id,
        &DomainEvent::AccountFrozen {
            account_id: aggregate_id,
        },
        Utc::now(),
    )
    .unwrap();

    let outbox = OutboxRepository::new(pool.clone());
    let mut tx = pool.begin().await.unwrap();
    outbox.append(&mut tx, &event).await.unwrap();
    tx.commit().await.unwrap();
    event
}

async fn fetch(pool: &PgPool, aggregate_id: Uuid) -> Vec<OutboxEvent> {
    OutboxRepository::new(pool.clone())
        .find_by_aggregate(aggregate_id)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_business_transaction_writes_outbox_events() {
    let pool = common::setup_test_db().await;
    let transfers = TransferService::new(pool.clone());

    let a = common::open_account(&pool, "Outbox", 10_000).await;
    let b = common::open_account(&pool, "Outbox", 0).await;

    // Account creation already queued an account.created event.
    let creation_events = fetch(&pool, a.id).await;
    assert!(creation_events
        .iter()
        .any(|e| e.event_type == "account.created"));

    let transfer = transfers
        .initiate(InitiateTransferCommand {
            source_account_id: a.id,
            destination_account_id: b.id,
            amount: 1_000,
            currency: "USD".to_string(),
            description: None,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let transfer_events = fetch(&pool, transfer.id).await;
    let types: Vec<&str> = transfer_events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"transfer.initiated"));
    assert!(types.contains(&"transfer.completed"));

    // The account legs were tagged with the account aggregates.
    let source_events = fetch(&pool, a.id).await;
    assert!(source_events.iter().any(|e| e.event_type == "account.debited"));
    let destination_events = fetch(&pool, b.id).await;
    assert!(destination_events
        .iter()
        .any(|e| e.event_type == "account.credited"));
}

#[tokio::test]
async fn test_processor_publishes_and_marks_events() {
    let pool = common::setup_test_db().await;
    let aggregate_id = Uuid::new_v4();
    append_event(&pool, aggregate_id).await;

    let processor = OutboxProcessor::new(pool.clone(), Arc::new(LoggingPublisher), settings());
    processor.run_once().await.unwrap();

    let events = fetch(&pool, aggregate_id).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].published_at.is_some());
    assert_eq!(events[0].attempt_count, 0);
}

#[tokio::test]
async fn test_failed_dispatch_increments_attempts_and_keeps_event() {
    let pool = common::setup_test_db().await;
    let aggregate_id = Uuid::new_v4();
    append_event(&pool, aggregate_id).await;

    let processor = OutboxProcessor::new(
        pool.clone(),
        Arc::new(FailingFor { aggregate_id }),
        settings(),
    );

    processor.run_once().await.unwrap();
    let events = fetch(&pool, aggregate_id).await;
    assert!(events[0].published_at.is_none());
    assert_eq!(events[0].attempt_count, 1);
    assert!(events[0].last_error.as_deref().unwrap().contains("broker"));

    processor.run_once().await.unwrap();
    let events = fetch(&pool, aggregate_id).await;
    assert_eq!(events[0].attempt_count, 2);
}

#[tokio::test]
async fn test_dead_letter_is_skipped_and_requeueable() {
    let pool = common::setup_test_db().await;
    let aggregate_id = Uuid::new_v4();
    append_event(&pool, aggregate_id).await;

    let failing = OutboxProcessor::new(
        pool.clone(),
        Arc::new(FailingFor { aggregate_id }),
        settings(),
    );
    for _ in 0..5 {
        failing.run_once().await.unwrap();
    }
    let events = fetch(&pool, aggregate_id).await;
    assert_eq!(events[0].attempt_count, 5);
    assert!(events[0].is_dead_letter(5));

    // Past the limit the processor stops attempting: the counter stays put.
    failing.run_once().await.unwrap();
    let events = fetch(&pool, aggregate_id).await;
    assert_eq!(events[0].attempt_count, 5);
    assert!(events[0].published_at.is_none());

    // Operator requeue resets it; a healthy publisher then drains it.
    let requeued = failing.requeue_dead_letters().await.unwrap();
    assert!(requeued >= 1);

    let healthy = OutboxProcessor::new(pool.clone(), Arc::new(LoggingPublisher), settings());
    healthy.run_once().await.unwrap();
    let events = fetch(&pool, aggregate_id).await;
    assert!(events[0].published_at.is_some());
}

#[tokio::test]
async fn test_locked_rows_are_skipped_by_concurrent_workers() {
    let pool = common::setup_test_db().await;
    let outbox = OutboxRepository::new(pool.clone());
    let aggregate_id = Uuid::new_v4();
    append_event(&pool, aggregate_id).await;

    // Worker one holds the batch lock in an open transaction.
    let mut tx1 = pool.begin().await.unwrap();
    let batch1 = outbox.lock_unpublished_batch(&mut tx1, 1_000).await.unwrap();
    assert!(batch1.iter().any(|e| e.aggregate_id == aggregate_id));

    // Worker two skips every row worker one holds.
    let mut tx2 = pool.begin().await.unwrap();
    let batch2 = outbox.lock_unpublished_batch(&mut tx2, 1_000).await.unwrap();
    assert!(!batch2.iter().any(|e| e.aggregate_id == aggregate_id));

    tx2.rollback().await.unwrap();
    tx1.rollback().await.unwrap();
}
