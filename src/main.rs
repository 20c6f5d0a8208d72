use fund_transfer_engine::api::{create_router, AppState};
use fund_transfer_engine::config::Settings;
use fund_transfer_engine::idempotency::IdempotencyCleanupJob;
use fund_transfer_engine::observability::{
    init_logging, init_metrics, HealthChecker, LogConfig, LogFormat,
};
use fund_transfer_engine::outbox::{
    EventPublisher, KafkaPublisher, LoggingPublisher, OutboxProcessor,
};
use fund_transfer_engine::repositories::run_migrations;
use fund_transfer_engine::services::ReconciliationService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration first (needed for log level)
    let settings = Settings::new()?;

    let log_config = LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(
            std::env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .as_str(),
        ),
        include_target: true,
    };
    init_logging(&log_config);

    let metrics_handle = init_metrics();
    info!("configuration loaded, metrics initialized");

    // Connect to PostgreSQL
    info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("database connection established");

    // Migrations run behind a named advisory lock
    run_migrations(&pool).await?;

    // Redis backs the rate limiter only; it is allowed to be down.
    let redis_client = redis::Client::open(settings.redis.url.clone())?;
    match redis_client.get_multiplexed_async_connection().await {
        Ok(mut con) => {
            let _: Result<(), _> = redis::cmd("PING").query_async(&mut con).await;
            info!("redis connection established");
        }
        Err(err) => {
            warn!(error = %err, "redis unavailable, rate limiter will fail open");
        }
    }

    // Kafka carries outbox events when reachable; otherwise events go to the
    // log publisher.
    info!("checking kafka connection...");
    let brokers = vec![settings.kafka.brokers.clone()];
    let kafka_client = match tokio::time::timeout(
        Duration::from_secs(3),
        rskafka::client::ClientBuilder::new(brokers).build(),
    )
    .await
    {
        Ok(Ok(client)) => {
            info!("kafka client created");
            Some(Arc::new(client))
        }
        Ok(Err(err)) => {
            warn!(error = %err, "kafka connection failed, publishing to log instead");
            None
        }
        Err(_) => {
            warn!("kafka connection timed out, publishing to log instead");
            None
        }
    };

    let publisher: Arc<dyn EventPublisher> = match &kafka_client {
        Some(client) => Arc::new(KafkaPublisher::new(
            client.clone(),
            settings.kafka.topic.clone(),
        )),
        None => Arc::new(LoggingPublisher),
    };

    // Background jobs: outbox delivery, idempotency cache cleanup, periodic
    // reconciliation.
    let processor = Arc::new(OutboxProcessor::new(
        pool.clone(),
        publisher,
        settings.outbox.clone(),
    ));
    processor.start();

    IdempotencyCleanupJob::new(pool.clone(), settings.idempotency.cleanup_interval_seconds)
        .start();

    if settings.reconciliation.interval_seconds > 0 {
        let reconciliation = ReconciliationService::new(pool.clone());
        let interval_seconds = settings.reconciliation.interval_seconds;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
            loop {
                interval.tick().await;
                match reconciliation.reconcile_all().await {
                    Ok(report) if report.mismatched > 0 => {
                        warn!(
                            checked = report.checked,
                            mismatched = report.mismatched,
                            "reconciliation found discrepancies"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "reconciliation pass failed"),
                }
            }
        });
    }

    let health_checker = Arc::new(HealthChecker::new(
        pool.clone(),
        redis_client.clone(),
        kafka_client.clone(),
    ));

    let state = AppState::new(pool, redis_client, kafka_client)
        .with_idempotency(settings.idempotency.clone())
        .with_rate_limit(settings.rate_limit.clone())
        .with_metrics(metrics_handle)
        .with_health_checker(health_checker);

    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", settings.application.port);
    info!("starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
