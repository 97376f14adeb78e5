//! # Event Registry
//!
//! The table of event names to ordered subscriber sequences.
//!
//! ## Locking
//!
//! One `tokio::sync::RwLock` guards the whole table. Subscribe and both
//! unsubscribe operations take it exclusively; publishes share it and hold it
//! for the full delivery, so every publish sees one unchanging sequence. A
//! slow recipient therefore stalls all mutations on every event until the
//! publish finishes.
//!
//! ## Re-entrancy
//!
//! A consumer that publishes to its own event from inside its receive loop
//! can deadlock: the publish waits on the consumer, which waits on the
//! publish.

use crate::publisher::EventPublisher;
use crate::stats::RegistryStats;
use crate::subscriber::{Delivery, EventSubscriber, Subscriber};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

/// Errors from registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The event was never subscribed to, or was removed by `unsubscribe_all`.
    #[error("Event not found: {event}")]
    NotFound {
        /// The event name that was looked up.
        event: String,
    },
}

impl RegistryError {
    fn not_found(event: &str) -> Self {
        Self::NotFound {
            event: event.to_string(),
        }
    }
}

type EventTable<T> = HashMap<String, Vec<Subscriber<T>>>;

/// Publish/subscribe registry keyed by event name.
///
/// Create one per bus and share it behind an `Arc`.
pub struct Registry<T> {
    events: RwLock<EventTable<T>>,
    stats: RegistryStats,
}

impl<T> Registry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            stats: RegistryStats::default(),
        }
    }

    /// Running counters for this registry.
    #[must_use]
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Whether `event` currently has a key, even an empty one.
    pub async fn contains_event(&self, event: &str) -> bool {
        self.events.read().await.contains_key(event)
    }

    /// Number of registrations under `event`, or `None` if the key is absent.
    pub async fn subscriber_count(&self, event: &str) -> Option<usize> {
        self.events.read().await.get(event).map(Vec::len)
    }

    /// All event names with a key, in no particular order.
    pub async fn event_names(&self) -> Vec<String> {
        self.events.read().await.keys().cloned().collect()
    }

    /// Close `handle` and drop every remaining registration of it.
    ///
    /// Purging the other events keeps closed handles out of every sequence.
    fn retire(&self, events: &mut EventTable<T>, handle: &Subscriber<T>) {
        if !handle.close() {
            return;
        }
        self.stats.record_closed();

        let id = handle.id();
        for (name, subscribers) in events.iter_mut() {
            let before = subscribers.len();
            subscribers.retain(|s| s.id() != id);
            if subscribers.len() != before {
                debug!(event = %name, subscriber = %id, "Closed handle purged from event");
            }
        }
    }
}

impl<T: Clone + Send + 'static> Registry<T> {
    /// Append `handle` to the sequence for `event`, creating it if needed.
    ///
    /// Registering the same handle twice makes it receive every payload twice.
    /// A handle the registry already closed is not admitted, but the event
    /// key is still created.
    pub async fn subscribe(&self, event: impl Into<String>, handle: Subscriber<T>) {
        let event = event.into();
        let id = handle.id();

        let mut events = self.events.write().await;
        let subscribers = events.entry(event.clone()).or_default();

        // Handles only close under the write lock, so this cannot go stale
        if handle.is_closed() {
            debug!(event = %event, subscriber = %id, "Closed handle not registered");
            return;
        }
        subscribers.push(handle);

        debug!(
            event = %event,
            subscriber = %id,
            subscribers = subscribers.len(),
            "Subscriber registered"
        );
    }

    /// Remove every registration of `handle` under `event` and close it.
    ///
    /// The event key stays even when its sequence becomes empty, so later
    /// publishes succeed with nobody to deliver to.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if `event` has no key.
    pub async fn unsubscribe(
        &self,
        event: &str,
        handle: &Subscriber<T>,
    ) -> Result<(), RegistryError> {
        let mut events = self.events.write().await;

        let removed = {
            let subscribers = events
                .get_mut(event)
                .ok_or_else(|| RegistryError::not_found(event))?;
            let before = subscribers.len();
            subscribers.retain(|s| s != handle);
            before - subscribers.len()
        };

        if removed > 0 {
            self.retire(&mut events, handle);
        }

        debug!(
            event = %event,
            subscriber = %handle.id(),
            removed = removed,
            "Subscriber unregistered"
        );
        Ok(())
    }

    /// Close every handle under `event`, in order, and remove the key.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if `event` has no key.
    pub async fn unsubscribe_all(&self, event: &str) -> Result<(), RegistryError> {
        let mut events = self.events.write().await;
        let subscribers = events
            .remove(event)
            .ok_or_else(|| RegistryError::not_found(event))?;

        for handle in &subscribers {
            self.retire(&mut events, handle);
        }

        debug!(event = %event, subscribers = subscribers.len(), "Event removed");
        Ok(())
    }

    /// Deliver `payload` to every recipient of `event`, one after another,
    /// waiting on each for as long as it takes.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if `event` has no key.
    pub async fn publish(&self, event: &str, payload: T) -> Result<(), RegistryError> {
        let events = self.events.read().await;
        let subscribers = events
            .get(event)
            .ok_or_else(|| RegistryError::not_found(event))?;
        self.stats.record_publish();

        for subscriber in subscribers {
            let outcome = subscriber.deliver(payload.clone()).await;
            self.record(event, subscriber, outcome);
        }

        debug!(event = %event, recipients = subscribers.len(), "Payload published");
        Ok(())
    }

    /// Like [`Registry::publish`], but give each recipient at most `timeout`.
    ///
    /// The bound is per recipient, so the call can take up to
    /// `recipients × timeout`. Recipients that miss it are skipped and the
    /// call still succeeds.
    ///
    /// A rendezvous recipient counts as skipped only if it never took the
    /// payload; one that acknowledged as the deadline fired counts as a
    /// delivery.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if `event` has no key.
    pub async fn publish_timeout(
        &self,
        event: &str,
        payload: T,
        timeout: Duration,
    ) -> Result<(), RegistryError> {
        let events = self.events.read().await;
        let subscribers = events
            .get(event)
            .ok_or_else(|| RegistryError::not_found(event))?;
        self.stats.record_publish();

        let mut skipped = 0usize;
        for subscriber in subscribers {
            let outcome = subscriber.deliver_within(payload.clone(), timeout).await;
            if outcome == Delivery::TimedOut {
                skipped += 1;
                warn!(
                    event = %event,
                    subscriber = %subscriber.id(),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Recipient did not accept payload in time, skipped"
                );
            }
            self.record(event, subscriber, outcome);
        }

        debug!(
            event = %event,
            recipients = subscribers.len(),
            skipped = skipped,
            "Payload published with timeout"
        );
        Ok(())
    }

    fn record(&self, event: &str, subscriber: &Subscriber<T>, outcome: Delivery) {
        match outcome {
            Delivery::Accepted => {
                self.stats.record_delivery();
                trace!(event = %event, subscriber = %subscriber.id(), "Payload delivered");
            }
            Delivery::Detached => {
                self.stats.record_detached();
                debug!(
                    event = %event,
                    subscriber = %subscriber.id(),
                    "Payload dropped (consumer gone)"
                );
            }
            Delivery::TimedOut => self.stats.record_skipped(),
        }
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> EventPublisher<T> for Registry<T> {
    async fn publish(&self, event: &str, payload: T) -> Result<(), RegistryError> {
        Registry::publish(self, event, payload).await
    }

    async fn publish_timeout(
        &self,
        event: &str,
        payload: T,
        timeout: Duration,
    ) -> Result<(), RegistryError> {
        Registry::publish_timeout(self, event, payload, timeout).await
    }

    fn events_published(&self) -> u64 {
        self.stats.snapshot().publishes
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> EventSubscriber<T> for Registry<T> {
    async fn subscribe(&self, event: String, handle: Subscriber<T>) {
        Registry::subscribe(self, event, handle).await;
    }

    async fn unsubscribe(&self, event: &str, handle: &Subscriber<T>) -> Result<(), RegistryError> {
        Registry::unsubscribe(self, event, handle).await
    }

    async fn unsubscribe_all(&self, event: &str) -> Result<(), RegistryError> {
        Registry::unsubscribe_all(self, event).await
    }
}
