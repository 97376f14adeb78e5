//! # Registry Demo
//!
//! Drives an event registry the way an application would:
//!
//! ```text
//! publisher ──publish("tick")──────────→ consumer 0..n  (buffered handles)
//!           └─publish_timeout("slow")──→ stalled consumer (rendezvous, never reads)
//! ```
//!
//! At the end every consumer is unsubscribed and reports how many ticks it
//! saw before its handle was closed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use event_registry::{channel, Registry, StatsSnapshot, Subscriber, SubscriptionError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Event the regular consumers listen on.
pub const TICK_EVENT: &str = "tick";

/// Event with a consumer that never drains its handle.
pub const SLOW_EVENT: &str = "slow";

/// Buffer size of each tick consumer's handle.
const CONSUMER_CAPACITY: usize = 4;

/// Demo configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Number of tick consumers.
    pub consumers: usize,
    /// Number of ticks to publish.
    pub ticks: usize,
    /// Pause between ticks.
    pub tick_interval: Duration,
    /// Per-recipient bound for publishes to the slow event.
    pub publish_timeout: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            consumers: 3,
            ticks: 10,
            tick_interval: Duration::from_millis(100),
            publish_timeout: Duration::from_millis(50),
        }
    }
}

impl DemoConfig {
    /// Load from `DEMO_CONSUMERS`, `DEMO_TICKS`, `DEMO_TICK_INTERVAL_MS` and
    /// `DEMO_PUBLISH_TIMEOUT_MS`. Unset or unparsable values keep defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());

        Self {
            consumers: parse("DEMO_CONSUMERS")
                .map(|v| v as usize)
                .unwrap_or(defaults.consumers),
            ticks: parse("DEMO_TICKS")
                .map(|v| v as usize)
                .unwrap_or(defaults.ticks),
            tick_interval: parse("DEMO_TICK_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            publish_timeout: parse("DEMO_PUBLISH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_timeout),
        }
    }
}

/// What the demo observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    /// Ticks received by each consumer, in consumer order.
    pub received: Vec<usize>,
    /// Registry counters at the end of the run.
    pub stats: StatsSnapshot,
}

/// Owns the registry and the consumer tasks for one run.
pub struct DemoRuntime {
    registry: Arc<Registry<String>>,
    config: DemoConfig,
}

impl DemoRuntime {
    /// Create a runtime with a fresh registry.
    pub fn new(config: DemoConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            config,
        }
    }

    /// The registry driven by this runtime.
    pub fn registry(&self) -> Arc<Registry<String>> {
        Arc::clone(&self.registry)
    }

    /// Run the full publish/unsubscribe cycle.
    pub async fn run(&self) -> Result<DemoReport> {
        let (handles, tasks) = self.spawn_consumers().await;
        // With no consumers the tick event is never created
        let ticking = !handles.is_empty();

        // Kept alive but never read, so every slow publish times out
        let (stalled, _stalled_subscription) = channel::<String>(0);
        self.registry.subscribe(SLOW_EVENT, stalled).await;

        for tick in 0..self.config.ticks {
            let payload = format!("tick-{tick}");
            if ticking {
                self.registry
                    .publish(TICK_EVENT, payload.clone())
                    .await
                    .context("Failed to publish tick")?;
            }
            self.registry
                .publish_timeout(SLOW_EVENT, payload, self.config.publish_timeout)
                .await
                .context("Failed to publish to slow consumer")?;
            if !self.config.tick_interval.is_zero() {
                tokio::time::sleep(self.config.tick_interval).await;
            }
        }

        if let Some(first) = handles.first() {
            self.registry
                .unsubscribe(TICK_EVENT, first)
                .await
                .context("Failed to unsubscribe first consumer")?;
            info!(subscriber = %first.id(), "First consumer unsubscribed");
        }
        if ticking {
            self.registry
                .unsubscribe_all(TICK_EVENT)
                .await
                .context("Failed to remove tick event")?;
        }
        self.registry
            .unsubscribe_all(SLOW_EVENT)
            .await
            .context("Failed to remove slow event")?;

        let mut received = Vec::with_capacity(tasks.len());
        for task in tasks {
            received.push(task.await.context("Consumer task panicked")?);
        }

        let stats = self.registry.stats().snapshot();
        info!(
            publishes = stats.publishes,
            deliveries = stats.deliveries,
            skipped = stats.skipped,
            closed = stats.closed,
            "Demo finished"
        );

        Ok(DemoReport { received, stats })
    }

    async fn spawn_consumers(&self) -> (Vec<Subscriber<String>>, Vec<JoinHandle<usize>>) {
        let mut handles = Vec::with_capacity(self.config.consumers);
        let mut tasks = Vec::with_capacity(self.config.consumers);

        for index in 0..self.config.consumers {
            let (handle, mut subscription) = channel::<String>(CONSUMER_CAPACITY);
            self.registry.subscribe(TICK_EVENT, handle.clone()).await;
            handles.push(handle);

            tasks.push(tokio::spawn(async move {
                let mut count = 0usize;
                loop {
                    match subscription.recv().await {
                        Ok(payload) => {
                            count += 1;
                            debug!(consumer = index, payload = %payload, "Tick received");
                        }
                        Err(SubscriptionError::Closed) => {
                            info!(consumer = index, received = count, "Subscription closed");
                            return count;
                        }
                    }
                }
            }));
        }

        (handles, tasks)
    }
}
