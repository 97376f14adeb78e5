//! # Registry Demo Binary
//!
//! Startup sequence:
//!
//! 1. Load telemetry and demo configuration from the environment
//! 2. Install logging and register metrics
//! 3. Run the publish/unsubscribe cycle
//! 4. Dump the Prometheus text exposition

use anyhow::{Context, Result};
use registry_demo::{DemoConfig, DemoRuntime};
use registry_telemetry::{encode_metrics, init_telemetry, record_registry_stats, TelemetryConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    let config = DemoConfig::from_env();
    info!(
        consumers = config.consumers,
        ticks = config.ticks,
        tick_interval_ms = config.tick_interval.as_millis() as u64,
        publish_timeout_ms = config.publish_timeout.as_millis() as u64,
        "Starting registry demo"
    );

    let runtime = DemoRuntime::new(config);
    let report = runtime.run().await?;
    info!(received = ?report.received, "Consumers drained");

    if telemetry.metrics_enabled {
        record_registry_stats(&runtime.registry()).await;
        let metrics = encode_metrics().context("Failed to encode metrics")?;
        info!("Metrics:\n{metrics}");
    }

    Ok(())
}
