pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{HealthChecker, HealthStatus, ServiceHealth};
pub use logging::{init_logging, mask_sensitive, LogConfig, LogFormat};
pub use metrics::{get_metrics, init_metrics, LatencyTimer, Metrics};
