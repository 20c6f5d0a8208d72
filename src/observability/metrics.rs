use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the transfer engine.
#[derive(Debug, Clone)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_account_created(&self, currency: &str) {
        counter!("transfer_engine_accounts_created_total", "currency" => currency.to_string())
            .increment(1);
    }

    pub fn record_transfer_completed(&self, currency: &str) {
        counter!("transfer_engine_transfers_completed_total", "currency" => currency.to_string())
            .increment(1);
    }

    pub fn record_transfer_failed(&self, failure_code: &str) {
        counter!("transfer_engine_transfers_failed_total", "code" => failure_code.to_string())
            .increment(1);
    }

    pub fn record_transfer_reversed(&self, currency: &str) {
        counter!("transfer_engine_transfers_reversed_total", "currency" => currency.to_string())
            .increment(1);
    }

    pub fn record_idempotency_replay(&self) {
        counter!("transfer_engine_idempotency_replays_total").increment(1);
    }

    pub fn record_outbox_published(&self) {
        counter!("transfer_engine_outbox_published_total").increment(1);
    }

    pub fn record_outbox_failed(&self) {
        counter!("transfer_engine_outbox_failed_total").increment(1);
    }

    pub fn record_outbox_dead_letter(&self) {
        counter!("transfer_engine_outbox_dead_letters_total").increment(1);
    }

    pub fn set_outbox_unpublished(&self, count: i64) {
        gauge!("transfer_engine_outbox_unpublished").set(count as f64);
    }

    pub fn record_reconciliation(&self, checked: u64, mismatched: u64) {
        counter!("transfer_engine_reconciliation_runs_total").increment(1);
        gauge!("transfer_engine_reconciliation_checked").set(checked as f64);
        gauge!("transfer_engine_reconciliation_mismatched").set(mismatched as f64);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

fn describe_metrics() {
    describe_counter!(
        "transfer_engine_accounts_created_total",
        Unit::Count,
        "Accounts opened"
    );
    describe_counter!(
        "transfer_engine_transfers_completed_total",
        Unit::Count,
        "Transfers completed"
    );
    describe_counter!(
        "transfer_engine_transfers_failed_total",
        Unit::Count,
        "Transfers failed by rule violations"
    );
    describe_counter!(
        "transfer_engine_transfers_reversed_total",
        Unit::Count,
        "Transfers reversed"
    );
    describe_counter!(
        "transfer_engine_idempotency_replays_total",
        Unit::Count,
        "Requests answered from the idempotency cache"
    );
    describe_counter!(
        "transfer_engine_outbox_published_total",
        Unit::Count,
        "Outbox events published"
    );
    describe_counter!(
        "transfer_engine_outbox_failed_total",
        Unit::Count,
        "Outbox dispatch attempts that failed"
    );
    describe_counter!(
        "transfer_engine_outbox_dead_letters_total",
        Unit::Count,
        "Outbox events past the attempt limit"
    );
    describe_gauge!(
        "transfer_engine_outbox_unpublished",
        Unit::Count,
        "Unpublished outbox backlog"
    );
    describe_counter!(
        "transfer_engine_reconciliation_runs_total",
        Unit::Count,
        "Reconciliation passes"
    );
    describe_gauge!(
        "transfer_engine_reconciliation_checked",
        Unit::Count,
        "Accounts checked by the last reconciliation pass"
    );
    describe_gauge!(
        "transfer_engine_reconciliation_mismatched",
        Unit::Count,
        "Accounts with discrepancies in the last reconciliation pass"
    );
    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!(
        "http_request_duration_ms",
        Unit::Milliseconds,
        "HTTP request latency in milliseconds"
    );
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
