//! # Event Registry - In-Process Publish/Subscribe
//!
//! Named events are observed by any number of independently registered
//! recipients. A publisher hands one payload to every current recipient of an
//! event without knowing who or how many they are; producers and consumers
//! share only the event name.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Producer    │                    │  Consumer    │
//! │              │    publish()       │ Subscription │
//! │              │ ──────┐            │      ↑       │
//! └──────────────┘       │            └──────┼───────┘
//!                        ▼                   │
//!                  ┌──────────────┐   Subscriber handle
//!                  │   Registry   │ ─────────┘
//!                  │ name → [h..] │  subscribe()
//!                  └──────────────┘
//! ```
//!
//! ## Delivery
//!
//! - `publish` waits on each recipient in registration order
//! - `publish_timeout` bounds the wait per recipient and skips laggards
//! - Only an unknown event name is an error; partial delivery never is
//!
//! ## Closing
//!
//! The registry closes a handle when it is unsubscribed. The consumer sees
//! [`SubscriptionError::Closed`] once buffered payloads are drained. A handle
//! is closed at most once, however many times it was registered.
//!
//! ## Example
//!
//! ```rust
//! use event_registry::{channel, Registry};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Registry::new();
//! let (handle, mut subscription) = channel(8);
//! registry.subscribe("tick", handle).await;
//!
//! registry.publish("tick", 42u64).await.unwrap();
//! assert_eq!(subscription.recv().await, Ok(42));
//! # }
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod publisher;
pub mod registry;
pub mod stats;
pub mod subscriber;

// Re-export main types
pub use publisher::EventPublisher;
pub use registry::{Registry, RegistryError};
pub use stats::{RegistryStats, StatsSnapshot};
pub use subscriber::{
    channel, unbounded, EventStream, EventSubscriber, Subscriber, SubscriberId, Subscription,
    SubscriptionError,
};

/// Buffer size for handles created with [`default_channel`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Create a bounded handle with [`DEFAULT_CHANNEL_CAPACITY`].
#[must_use]
pub fn default_channel<T>() -> (Subscriber<T>, Subscription<T>) {
    channel(DEFAULT_CHANNEL_CAPACITY)
}
