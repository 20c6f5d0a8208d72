use crate::error::{AppError, Result};
use crate::models::{DomainEvent, TaggedEvent};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A durable event row, written inside the same transaction as the business
/// change and delivered asynchronously by the outbox processor.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
}

impl OutboxEvent {
    pub fn new(
        aggregate_id: Uuid,
        event: &DomainEvent,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self> {
        let payload = serde_json::to_value(event)
            .map_err(|e| AppError::Internal(anyhow!("failed to serialize domain event: {}", e)))?;
        Ok(Self {
            id: Uuid::now_v7(),
            aggregate_type: event.aggregate_type().to_string(),
            aggregate_id,
            event_type: event.event_type().to_string(),
            payload,
            occurred_at,
            created_at: Utc::now(),
            published_at: None,
            attempt_count: 0,
            last_error: None,
        })
    }

    pub fn from_tagged(tagged: &TaggedEvent, occurred_at: DateTime<Utc>) -> Result<Self> {
        Self::new(tagged.aggregate_id, &tagged.event, occurred_at)
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    pub fn is_dead_letter(&self, max_attempts: i32) -> bool {
        self.published_at.is_none() && self.attempt_count >= max_attempts
    }
}
