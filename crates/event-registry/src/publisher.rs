//! # Event Publisher
//!
//! Defines the publishing side of the registry.

use crate::registry::RegistryError;
use async_trait::async_trait;
use std::time::Duration;

/// Trait for publishing payloads to named events.
///
/// Producers hold this rather than the concrete registry so they only know
/// event names, never the recipients.
#[async_trait]
pub trait EventPublisher<T: Send + 'static>: Send + Sync {
    /// Deliver `payload` to every recipient of `event`, waiting on each in
    /// turn for as long as it takes.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if nobody ever subscribed to `event`.
    async fn publish(&self, event: &str, payload: T) -> Result<(), RegistryError>;

    /// Like [`EventPublisher::publish`], but give each recipient at most
    /// `timeout` before skipping it. Skipped recipients are not an error.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if nobody ever subscribed to `event`.
    async fn publish_timeout(
        &self,
        event: &str,
        payload: T,
        timeout: Duration,
    ) -> Result<(), RegistryError>;

    /// Get the total number of publishes that found their event.
    fn events_published(&self) -> u64;
}
