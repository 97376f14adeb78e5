//! # Registry Telemetry
//!
//! Logging and metrics setup for processes that host an event registry.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter` and a pretty or
//!   JSON `fmt` layer
//! - **Metrics**: Prometheus gauges refreshed from registry statistics
//!
//! ## Usage
//!
//! ```rust,ignore
//! use registry_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config).expect("Failed to init telemetry");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ER_SERVICE_NAME` | `event-registry` | Service name in logs |
//! | `ER_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `ER_CONSOLE_OUTPUT` | `true` | Write log lines to stdout |
//! | `ER_JSON_LOGS` | `false` | JSON log lines (default `true` in containers) |
//! | `ER_METRICS_ENABLED` | `true` | Register Prometheus collectors |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{encode_metrics, record_registry_stats, record_snapshot, register_metrics};
pub use tracing_setup::{env_filter, init_tracing};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and, if enabled, register the metrics collectors.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if config.metrics_enabled {
        register_metrics()?;
    }
    init_tracing(config)
}
