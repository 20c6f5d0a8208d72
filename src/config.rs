use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub kafka: KafkaSettings,
    pub application: ApplicationSettings,
    #[serde(default)]
    pub idempotency: IdempotencySettings,
    #[serde(default)]
    pub outbox: OutboxSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub reconciliation: ReconciliationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    pub brokers: String,
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencySettings {
    /// Response cache TTL; 24 hours unless overridden.
    pub ttl_seconds: i64,
    /// Per-key advisory lock wait.
    pub lock_timeout_ms: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 86_400,
            lock_timeout_ms: 5_000,
            cleanup_interval_seconds: 3_600,
        }
    }
}

impl IdempotencySettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxSettings {
    pub poll_interval_ms: u64,
    pub batch_size: i64,
    pub max_attempts: i32,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            batch_size: 50,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// 0 disables the limiter.
    pub requests_per_minute: i64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationSettings {
    /// 0 disables the periodic job.
    pub interval_seconds: u64,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
