use crate::error::{AppError, Result};
use crate::models::OutboxEvent;
use anyhow::anyhow;
use async_trait::async_trait;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::Client as KafkaClient;
use rskafka::record::Record;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Where the outbox processor hands events off to. Delivery is
/// at-least-once; consumers deduplicate on the event id.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> Result<()>;
}

/// Kafka dispatch target. One partition client per topic, keyed by the
/// aggregate id so an aggregate's events stay ordered within a partition.
pub struct KafkaPublisher {
    client: Arc<KafkaClient>,
    topic: String,
    partition_clients: Arc<RwLock<BTreeMap<String, Arc<PartitionClient>>>>,
}

impl KafkaPublisher {
    pub fn new(client: Arc<KafkaClient>, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
            partition_clients: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    async fn partition_client(&self, topic: &str) -> Result<Arc<PartitionClient>> {
        {
            let clients = self.partition_clients.read().await;
            if let Some(client) = clients.get(topic) {
                return Ok(client.clone());
            }
        }

        let partition_client = self
            .client
            .partition_client(topic.to_string(), 0, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| AppError::Internal(anyhow!("failed to open partition client: {}", e)))?;
        let partition_client = Arc::new(partition_client);

        let mut clients = self.partition_clients.write().await;
        clients.insert(topic.to_string(), partition_client.clone());
        Ok(partition_client)
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        let partition_client = self.partition_client(&self.topic).await?;

        let value = serde_json::to_vec(event)
            .map_err(|e| AppError::Internal(anyhow!("failed to serialize outbox event: {}", e)))?;
        let record = Record {
            key: Some(event.aggregate_id.to_string().into_bytes()),
            value: Some(value),
            headers: BTreeMap::new(),
            timestamp: event.occurred_at,
        };

        partition_client
            .produce(vec![record], Compression::NoCompression)
            .await
            .map_err(|e| AppError::Internal(anyhow!("kafka produce failed: {}", e)))?;

        debug!(event_id = %event.id, event_type = %event.event_type, topic = %self.topic, "event published");
        Ok(())
    }
}

/// Fallback target when Kafka is not configured: events are logged and
/// considered delivered.
pub struct LoggingPublisher;

#[async_trait]
impl EventPublisher for LoggingPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            aggregate_type = %event.aggregate_type,
            aggregate_id = %event.aggregate_id,
            "outbox event dispatched to log"
        );
        Ok(())
    }
}
