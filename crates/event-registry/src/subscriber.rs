//! # Subscriber Handles
//!
//! Defines the delivery endpoints registered against event names and the
//! consumer half that reads from them.
//!
//! A handle is created by the consumer with [`channel`] or [`unbounded`]:
//! the [`Subscriber`] half is handed to the registry, the [`Subscription`]
//! half stays with the consumer. Only the registry may close a handle, and it
//! does so at most once.

use crate::registry::RegistryError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;
use tracing::trace;
use uuid::Uuid;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The registry closed the handle and every buffered payload was drained.
    #[error("Subscription closed")]
    Closed,
}

/// Trait for managing subscriptions on the registry.
#[async_trait]
pub trait EventSubscriber<T: Send + 'static>: Send + Sync {
    /// Register `handle` under `event`.
    async fn subscribe(&self, event: String, handle: Subscriber<T>);

    /// Remove and close every occurrence of `handle` under `event`.
    async fn unsubscribe(&self, event: &str, handle: &Subscriber<T>) -> Result<(), RegistryError>;

    /// Close every handle under `event` and forget the event.
    async fn unsubscribe_all(&self, event: &str) -> Result<(), RegistryError>;
}

/// Identity of a subscriber handle. Clones of a handle share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The consumer side accepted the payload.
    Accepted,
    /// The consumer half is gone; the payload was dropped.
    Detached,
    /// The consumer did not take the payload before the deadline.
    TimedOut,
}

impl Delivery {
    fn from_sent(delivered: bool) -> Self {
        if delivered {
            Self::Accepted
        } else {
            Self::Detached
        }
    }
}

/// A payload in flight. Rendezvous deliveries carry an ack that the consumer
/// must complete for the payload to count as received.
pub(crate) struct Envelope<T> {
    payload: T,
    ack: Option<oneshot::Sender<()>>,
}

impl<T> Envelope<T> {
    fn new(payload: T) -> Self {
        Self { payload, ack: None }
    }

    fn with_ack(payload: T, ack: oneshot::Sender<()>) -> Self {
        Self {
            payload,
            ack: Some(ack),
        }
    }

    /// Take the payload, or `None` if the publisher already gave up on it.
    fn accept(self) -> Option<T> {
        let Envelope { payload, ack } = self;
        match ack {
            None => Some(payload),
            Some(ack) => ack.send(()).ok().map(|()| payload),
        }
    }
}

enum Outlet<T> {
    Buffered(mpsc::Sender<Envelope<T>>),
    Rendezvous(mpsc::Sender<Envelope<T>>),
    Unbounded(mpsc::UnboundedSender<Envelope<T>>),
}

impl<T> Clone for Outlet<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Buffered(tx) => Self::Buffered(tx.clone()),
            Self::Rendezvous(tx) => Self::Rendezvous(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

enum Inlet<T> {
    Bounded(mpsc::Receiver<Envelope<T>>),
    Unbounded(mpsc::UnboundedReceiver<Envelope<T>>),
}

impl<T> Inlet<T> {
    async fn recv(&mut self) -> Option<Envelope<T>> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }

    fn try_recv(&mut self) -> Result<Envelope<T>, TryRecvError> {
        match self {
            Self::Bounded(rx) => rx.try_recv(),
            Self::Unbounded(rx) => rx.try_recv(),
        }
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Envelope<T>>> {
        match self {
            Self::Bounded(rx) => rx.poll_recv(cx),
            Self::Unbounded(rx) => rx.poll_recv(cx),
        }
    }
}

/// Create a handle with room for `capacity` undelivered payloads.
///
/// A capacity of `0` creates a rendezvous handle: a send completes only once
/// the consumer has taken the payload.
#[must_use]
pub fn channel<T>(capacity: usize) -> (Subscriber<T>, Subscription<T>) {
    let id = SubscriberId::new();
    let (outlet, inlet) = if capacity == 0 {
        let (tx, rx) = mpsc::channel(1);
        (Outlet::Rendezvous(tx), Inlet::Bounded(rx))
    } else {
        let (tx, rx) = mpsc::channel(capacity);
        (Outlet::Buffered(tx), Inlet::Bounded(rx))
    };
    (Subscriber::new(id, outlet), Subscription::new(id, inlet))
}

/// Create a handle whose sends never wait.
#[must_use]
pub fn unbounded<T>() -> (Subscriber<T>, Subscription<T>) {
    let id = SubscriberId::new();
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Subscriber::new(id, Outlet::Unbounded(tx)),
        Subscription::new(id, Inlet::Unbounded(rx)),
    )
}

/// The delivery endpoint registered with the registry.
///
/// Cloning yields the same handle: same identity, same closed state.
pub struct Subscriber<T> {
    id: SubscriberId,
    outlet: Arc<Mutex<Option<Outlet<T>>>>,
}

impl<T> Subscriber<T> {
    fn new(id: SubscriberId, outlet: Outlet<T>) -> Self {
        Self {
            id,
            outlet: Arc::new(Mutex::new(Some(outlet))),
        }
    }

    /// Identity used by unsubscribe to match registrations.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the registry has closed this handle.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outlet.lock().is_none()
    }

    /// Drop the sending side. Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> bool {
        self.outlet.lock().take().is_some()
    }
}

impl<T: Send> Subscriber<T> {
    /// Send `payload`, waiting as long as the consumer needs to accept it.
    pub(crate) async fn deliver(&self, payload: T) -> Delivery {
        let outlet = self.outlet.lock().clone();
        let Some(outlet) = outlet else {
            return Delivery::Detached;
        };

        let delivered = match outlet {
            Outlet::Unbounded(tx) => tx.send(Envelope::new(payload)).is_ok(),
            Outlet::Buffered(tx) => tx.send(Envelope::new(payload)).await.is_ok(),
            Outlet::Rendezvous(tx) => {
                let (ack_tx, ack_rx) = oneshot::channel();
                tx.send(Envelope::with_ack(payload, ack_tx)).await.is_ok() && ack_rx.await.is_ok()
            }
        };

        Delivery::from_sent(delivered)
    }

    /// Like `deliver`, but give up once `timeout` elapses.
    ///
    /// A rendezvous ack that lands as the deadline fires still counts: the
    /// ack receiver is closed first, so the consumer either got its ack in
    /// before the close and keeps the payload, or discards it.
    pub(crate) async fn deliver_within(&self, payload: T, timeout: Duration) -> Delivery {
        let outlet = self.outlet.lock().clone();
        let tx = match outlet {
            None => return Delivery::Detached,
            Some(Outlet::Rendezvous(tx)) => tx,
            Some(_) => {
                return tokio::time::timeout(timeout, self.deliver(payload))
                    .await
                    .unwrap_or(Delivery::TimedOut);
            }
        };

        let (ack_tx, mut ack_rx) = oneshot::channel();
        let handoff = async {
            tx.send(Envelope::with_ack(payload, ack_tx)).await.is_ok() && (&mut ack_rx).await.is_ok()
        };
        let outcome = tokio::time::timeout(timeout, handoff).await;

        match outcome {
            Ok(delivered) => Delivery::from_sent(delivered),
            Err(_) => {
                ack_rx.close();
                if ack_rx.try_recv().is_ok() {
                    Delivery::Accepted
                } else {
                    Delivery::TimedOut
                }
            }
        }
    }
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            outlet: Arc::clone(&self.outlet),
        }
    }
}

impl<T> PartialEq for Subscriber<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Subscriber<T> {}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The consumer half of a handle.
pub struct Subscription<T> {
    id: SubscriberId,
    inlet: Inlet<T>,
}

impl<T> Subscription<T> {
    fn new(id: SubscriberId, inlet: Inlet<T>) -> Self {
        Self { id, inlet }
    }

    /// Identity shared with the paired [`Subscriber`].
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receive the next payload.
    ///
    /// # Returns
    ///
    /// - `Ok(payload)` - The next delivered payload
    /// - `Err(SubscriptionError::Closed)` - The handle was closed and drained
    pub async fn recv(&mut self) -> Result<T, SubscriptionError> {
        loop {
            let Some(envelope) = self.inlet.recv().await else {
                return Err(SubscriptionError::Closed);
            };
            if let Some(payload) = envelope.accept() {
                return Ok(payload);
            }
            trace!(subscriber = %self.id, "Discarded payload abandoned by publisher");
        }
    }

    /// Try to receive the next payload without waiting.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(payload))` - A payload was available
    /// - `Ok(None)` - Nothing available right now
    /// - `Err(SubscriptionError::Closed)` - The handle was closed and drained
    pub fn try_recv(&mut self) -> Result<Option<T>, SubscriptionError> {
        loop {
            let envelope = match self.inlet.try_recv() {
                Ok(envelope) => envelope,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(SubscriptionError::Closed),
            };
            if let Some(payload) = envelope.accept() {
                return Ok(Some(payload));
            }
        }
    }

    /// Convert into a `Stream` that ends when the handle is closed.
    #[must_use]
    pub fn into_stream(self) -> EventStream<T> {
        EventStream::new(self)
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// A stream wrapper for subscriptions.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
pub struct EventStream<T> {
    subscription: Subscription<T>,
}

impl<T> EventStream<T> {
    /// Create a new event stream from a subscription.
    #[must_use]
    pub fn new(subscription: Subscription<T>) -> Self {
        Self { subscription }
    }

    /// Identity of the underlying handle.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.subscription.id()
    }
}

impl<T> Unpin for EventStream<T> {}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.subscription.inlet.poll_recv(cx) {
                Poll::Ready(Some(envelope)) => {
                    if let Some(payload) = envelope.accept() {
                        return Poll::Ready(Some(payload));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
