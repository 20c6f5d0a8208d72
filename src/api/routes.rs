use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rskafka::client::Client as KafkaClient;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::{
    correlation_id, rate_limit, require_json, security_headers, track_metrics,
};
use crate::config::{IdempotencySettings, RateLimitSettings};
use crate::idempotency::idempotency_layer;
use crate::observability::HealthChecker;

/// Application state shared across handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis_client: redis::Client,
    pub kafka_client: Option<Arc<KafkaClient>>,
    pub idempotency: IdempotencySettings,
    pub rate_limit: RateLimitSettings,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Option<Arc<HealthChecker>>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis_client: redis::Client,
        kafka_client: Option<Arc<KafkaClient>>,
    ) -> Self {
        Self {
            pool,
            redis_client,
            kafka_client,
            idempotency: IdempotencySettings::default(),
            rate_limit: RateLimitSettings::default(),
            metrics_handle: None,
            health_checker: None,
        }
    }

    pub fn with_idempotency(mut self, settings: IdempotencySettings) -> Self {
        self.idempotency = settings;
        self
    }

    pub fn with_rate_limit(mut self, settings: RateLimitSettings) -> Self {
        self.rate_limit = settings;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn with_health_checker(mut self, checker: Arc<HealthChecker>) -> Self {
        self.health_checker = Some(checker);
        self
    }
}

/// Creates the API router. Layer order (outermost first): correlation id,
/// security headers, trace, metrics, rate limit, content-type check,
/// idempotency pre-filter, handler.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Account endpoints
        .route("/accounts", post(handlers::create_account))
        .route("/accounts/:id", get(handlers::get_account))
        .route("/accounts/:id/freeze", post(handlers::freeze_account))
        .route("/accounts/:id/unfreeze", post(handlers::unfreeze_account))
        .route("/accounts/:id/close", post(handlers::close_account))
        .route(
            "/accounts/:id/transfers",
            get(handlers::list_account_transfers),
        )
        .route("/accounts/:id/statement", get(handlers::get_statement))
        // Transfer endpoints
        .route(
            "/transfers",
            post(handlers::create_transfer).get(handlers::list_transfers),
        )
        .route("/transfers/:id", get(handlers::get_transfer))
        .route("/transfers/:id/reverse", post(handlers::reverse_transfer))
        // Innermost layer first; the last layer added runs outermost.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency_layer,
        ))
        .layer(middleware::from_fn(require_json))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(correlation_id))
        .with_state(state)
}
