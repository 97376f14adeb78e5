//! # Registry Statistics
//!
//! Lock-free counters updated by the registry on every operation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for a registry.
#[derive(Debug, Default)]
pub struct RegistryStats {
    publishes: AtomicU64,
    deliveries: AtomicU64,
    skipped: AtomicU64,
    detached: AtomicU64,
    closed: AtomicU64,
}

/// Point-in-time copy of [`RegistryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Publish calls that found their event.
    pub publishes: u64,
    /// Payloads accepted by a recipient.
    pub deliveries: u64,
    /// Recipients skipped because they did not accept in time.
    pub skipped: u64,
    /// Recipients whose consumer half was gone.
    pub detached: u64,
    /// Handles closed by the registry.
    pub closed: u64,
}

impl RegistryStats {
    pub(crate) fn record_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detached(&self) {
        self.detached.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            publishes: self.publishes.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            detached: self.detached.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
        }
    }
}
