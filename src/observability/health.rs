use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Health status of the service or one of its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Per-dependency state reported by /health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub database: bool,
    pub redis: bool,
    pub kafka: bool,
}

/// Checks the dependencies behind the engine. The database is the only one
/// that makes the service unhealthy; Redis and Kafka degrade gracefully.
pub struct HealthChecker {
    pool: PgPool,
    redis_client: redis::Client,
    kafka_client: Option<Arc<rskafka::client::Client>>,
    start_time: std::time::Instant,
}

impl HealthChecker {
    pub fn new(
        pool: PgPool,
        redis_client: redis::Client,
        kafka_client: Option<Arc<rskafka::client::Client>>,
    ) -> Self {
        Self {
            pool,
            redis_client,
            kafka_client,
            start_time: std::time::Instant::now(),
        }
    }

    pub async fn check_database(&self) -> bool {
        matches!(
            tokio::time::timeout(
                Duration::from_secs(5),
                sqlx::query("SELECT 1").fetch_one(&self.pool),
            )
            .await,
            Ok(Ok(_))
        )
    }

    pub async fn check_redis(&self) -> bool {
        match self.redis_client.get_multiplexed_async_connection().await {
            Ok(mut conn) => matches!(
                tokio::time::timeout(
                    Duration::from_secs(5),
                    redis::cmd("PING").query_async::<_, ()>(&mut conn),
                )
                .await,
                Ok(Ok(_))
            ),
            Err(_) => false,
        }
    }

    pub fn check_kafka(&self) -> bool {
        self.kafka_client.is_some()
    }

    pub async fn check_all(&self) -> (HealthStatus, ServiceHealth) {
        let database = self.check_database().await;
        let services = ServiceHealth {
            database,
            redis: self.check_redis().await,
            kafka: self.check_kafka(),
        };
        let status = if database {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        (status, services)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
