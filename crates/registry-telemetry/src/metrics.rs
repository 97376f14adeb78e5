//! Prometheus metrics mirroring registry statistics.
//!
//! All metrics follow the naming convention: `er_registry_<metric>`.
//! The registry keeps its own atomic counters; these gauges are refreshed
//! from a snapshot by [`record_registry_stats`] before each scrape.

use event_registry::{Registry as EventRegistry, StatsSnapshot};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Metrics registry for this crate's collectors
    pub static ref REGISTRY: Registry = Registry::new();

    /// Publish calls that found their event
    pub static ref PUBLISHES: IntGauge = IntGauge::new(
        "er_registry_publishes",
        "Publish calls that found their event"
    ).expect("metric creation failed");

    /// Payloads accepted by recipients
    pub static ref DELIVERIES: IntGauge = IntGauge::new(
        "er_registry_deliveries",
        "Payloads accepted by recipients"
    ).expect("metric creation failed");

    /// Recipients skipped by publish_timeout
    pub static ref SKIPPED: IntGauge = IntGauge::new(
        "er_registry_skipped",
        "Recipients that did not accept a payload before the timeout"
    ).expect("metric creation failed");

    /// Recipients whose consumer was gone
    pub static ref DETACHED: IntGauge = IntGauge::new(
        "er_registry_detached",
        "Payloads dropped because the consumer half was gone"
    ).expect("metric creation failed");

    /// Handles closed by the registry
    pub static ref CLOSED: IntGauge = IntGauge::new(
        "er_registry_closed",
        "Subscriber handles closed by the registry"
    ).expect("metric creation failed");

    /// Event names currently present
    pub static ref EVENTS: IntGauge = IntGauge::new(
        "er_registry_events",
        "Event names currently present in the registry"
    ).expect("metric creation failed");

    /// Registrations across all events
    pub static ref SUBSCRIBERS: IntGauge = IntGauge::new(
        "er_registry_subscribers",
        "Subscriber registrations across all events"
    ).expect("metric creation failed");
}

/// Register all collectors. Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PUBLISHES.clone()),
        Box::new(DELIVERIES.clone()),
        Box::new(SKIPPED.clone()),
        Box::new(DETACHED.clone()),
        Box::new(CLOSED.clone()),
        Box::new(EVENTS.clone()),
        Box::new(SUBSCRIBERS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Copy a stats snapshot into the gauges.
pub fn record_snapshot(snapshot: &StatsSnapshot) {
    PUBLISHES.set(saturating_i64(snapshot.publishes));
    DELIVERIES.set(saturating_i64(snapshot.deliveries));
    SKIPPED.set(saturating_i64(snapshot.skipped));
    DETACHED.set(saturating_i64(snapshot.detached));
    CLOSED.set(saturating_i64(snapshot.closed));
}

/// Refresh every gauge from `registry`.
pub async fn record_registry_stats<T>(registry: &EventRegistry<T>) {
    record_snapshot(&registry.stats().snapshot());

    let names = registry.event_names().await;
    let mut subscribers = 0usize;
    for name in &names {
        subscribers += registry.subscriber_count(name).await.unwrap_or(0);
    }
    EVENTS.set(saturating_i64(names.len() as u64));
    SUBSCRIBERS.set(saturating_i64(subscribers as u64));
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
