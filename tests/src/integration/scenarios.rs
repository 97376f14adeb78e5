//! # Publish/Subscribe Scenarios
//!
//! End-to-end behaviour of the registry as producers and consumers see it,
//! going through the `EventPublisher` / `EventSubscriber` seams where a real
//! component would.
//!
//! ## Flows Tested:
//!
//! 1. **Subscribe → Publish**: a single recipient gets exactly the payload
//! 2. **Fan-out**: every recipient gets the payload once, in registration order
//! 3. **Unknown events**: `NotFound` returns immediately
//! 4. **Bounded wait**: a stalled recipient costs one timeout, not forever
//! 5. **Removal**: `unsubscribe_all` forgets the event, `unsubscribe` keeps it

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::time::timeout;

    use event_registry::{
        channel, unbounded, EventPublisher, EventSubscriber, Registry, RegistryError,
        SubscriptionError,
    };

    const WAIT: Duration = Duration::from_millis(500);

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// A registry exposed through both traits, as separate components would hold it
    fn wired<T: Clone + Send + 'static>(
    ) -> (Arc<dyn EventPublisher<T>>, Arc<dyn EventSubscriber<T>>) {
        let registry = Arc::new(Registry::<T>::new());
        let publisher: Arc<dyn EventPublisher<T>> = registry.clone();
        let subscriber: Arc<dyn EventSubscriber<T>> = registry;
        (publisher, subscriber)
    }

    // =============================================================================
    // DELIVERY
    // =============================================================================

    /// Subscribe("tick", h); Publish("tick", 42) ⇒ h receives 42
    #[tokio::test]
    async fn test_single_subscriber_receives_payload() {
        let (publisher, subscriber) = wired::<u64>();
        let (handle, mut sub) = channel(1);
        subscriber.subscribe("tick".to_string(), handle).await;

        let result = publisher.publish("tick", 42).await;
        assert_eq!(result, Ok(()));

        let received = timeout(WAIT, sub.recv()).await.expect("timeout");
        assert_eq!(received, Ok(42));
        assert_eq!(sub.try_recv(), Ok(None), "payload delivered exactly once");
    }

    /// Subscribe("x", h1); Subscribe("x", h2); Publish("x", "hello") ⇒ both receive
    #[tokio::test]
    async fn test_two_subscribers_both_receive() {
        let (publisher, subscriber) = wired::<String>();
        let (h1, mut s1) = channel(1);
        let (h2, mut s2) = channel(1);
        subscriber.subscribe("x".to_string(), h1).await;
        subscriber.subscribe("x".to_string(), h2).await;

        publisher
            .publish("x", "hello".to_string())
            .await
            .expect("publish");

        assert_eq!(s1.recv().await, Ok("hello".to_string()));
        assert_eq!(s2.recv().await, Ok("hello".to_string()));
        assert_eq!(s1.try_recv(), Ok(None));
        assert_eq!(s2.try_recv(), Ok(None));
    }

    /// Sequential payloads arrive in publish order on every recipient
    #[tokio::test]
    async fn test_payload_order_preserved_per_recipient() {
        let registry = Registry::new();
        let (h1, s1) = unbounded::<u32>();
        let (h2, s2) = unbounded::<u32>();
        registry.subscribe("seq", h1.clone()).await;
        registry.subscribe("seq", h2.clone()).await;

        for i in 0..50 {
            registry.publish("seq", i).await.expect("publish");
        }
        registry.unsubscribe_all("seq").await.expect("unsubscribe_all");

        use futures::StreamExt;
        let first: Vec<u32> = s1.into_stream().collect().await;
        let second: Vec<u32> = s2.into_stream().collect().await;
        let expected: Vec<u32> = (0..50).collect();
        assert_eq!(first, expected);
        assert_eq!(second, expected);
    }

    // =============================================================================
    // UNKNOWN EVENTS
    // =============================================================================

    /// Unsubscribe("missing", h) ⇒ NotFound, h untouched
    #[tokio::test]
    async fn test_unsubscribe_unknown_event() {
        let (_, subscriber) = wired::<u8>();
        let (handle, mut sub) = channel(1);

        let started = Instant::now();
        let result = subscriber.unsubscribe("missing", &handle).await;

        assert_eq!(
            result,
            Err(RegistryError::NotFound {
                event: "missing".to_string()
            })
        );
        assert!(started.elapsed() < WAIT);
        assert!(!handle.is_closed());
        assert_eq!(sub.try_recv(), Ok(None));
    }

    /// Publish on a name nobody subscribed to ⇒ NotFound without blocking
    #[tokio::test]
    async fn test_publish_unknown_event() {
        let (publisher, _) = wired::<u8>();

        let result = timeout(WAIT, publisher.publish("never", 1))
            .await
            .expect("publish to unknown event must not block");
        assert!(matches!(result, Err(RegistryError::NotFound { .. })));
    }

    // =============================================================================
    // BOUNDED WAIT
    // =============================================================================

    /// A rendezvous recipient that never reads costs one timeout and gets nothing
    #[tokio::test]
    async fn test_publish_timeout_with_stalled_recipient() {
        let (publisher, subscriber) = wired::<&'static str>();
        let (handle, mut sub) = channel(0);
        subscriber.subscribe("slow".to_string(), handle).await;

        let started = Instant::now();
        let result = publisher
            .publish_timeout("slow", "data", Duration::from_millis(50))
            .await;
        let elapsed = started.elapsed();

        assert_eq!(result, Ok(()));
        assert!(elapsed >= Duration::from_millis(50), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "took too long: {elapsed:?}");
        assert_eq!(sub.try_recv(), Ok(None), "skipped recipient must not see the payload");
    }

    /// The timeout applies per recipient: n stalled recipients cost about n × timeout
    #[tokio::test]
    async fn test_publish_timeout_is_per_recipient() {
        let registry = Registry::new();
        let mut keep = Vec::new();
        for _ in 0..3 {
            let (handle, sub) = channel::<u8>(0);
            registry.subscribe("stalled", handle).await;
            keep.push(sub);
        }

        let started = Instant::now();
        registry
            .publish_timeout("stalled", 1, Duration::from_millis(30))
            .await
            .expect("publish_timeout");

        assert!(started.elapsed() >= Duration::from_millis(90));
        assert_eq!(registry.stats().snapshot().skipped, 3);
    }

    // =============================================================================
    // REMOVAL
    // =============================================================================

    /// Subscribe("e", h); UnsubscribeAll("e"); Publish("e", "x") ⇒ NotFound
    #[tokio::test]
    async fn test_unsubscribe_all_then_publish() {
        let registry = Arc::new(Registry::<&'static str>::new());
        let (handle, mut sub) = channel(1);
        registry.subscribe("e", handle.clone()).await;

        registry.unsubscribe_all("e").await.expect("unsubscribe_all");

        assert!(matches!(
            registry.publish("e", "x").await,
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            registry.unsubscribe("e", &handle).await,
            Err(RegistryError::NotFound { .. })
        ));
        assert_eq!(sub.recv().await, Err(SubscriptionError::Closed));
    }

    /// Removing the last handle individually keeps the event publishable
    #[tokio::test]
    async fn test_unsubscribe_last_handle_keeps_event() {
        let (publisher, subscriber) = wired::<u8>();
        let (handle, mut sub) = channel(1);
        subscriber.subscribe("e".to_string(), handle.clone()).await;

        subscriber.unsubscribe("e", &handle).await.expect("unsubscribe");

        assert_eq!(sub.recv().await, Err(SubscriptionError::Closed));
        assert_eq!(publisher.publish("e", 1).await, Ok(()));
    }

    /// Unsubscribing one handle leaves its neighbours untouched
    #[tokio::test]
    async fn test_unsubscribe_leaves_others() {
        let registry = Registry::new();
        let (gone, mut gone_sub) = channel::<u8>(2);
        let (stay, mut stay_sub) = channel::<u8>(2);
        registry.subscribe("e", gone.clone()).await;
        registry.subscribe("e", stay.clone()).await;

        registry.unsubscribe("e", &gone).await.expect("unsubscribe");
        registry.publish("e", 7).await.expect("publish");

        assert_eq!(gone_sub.recv().await, Err(SubscriptionError::Closed));
        assert_eq!(stay_sub.recv().await, Ok(7));
        assert!(!stay.is_closed());
    }

    /// Registries are independent values
    #[tokio::test]
    async fn test_registries_are_isolated() {
        let first = Registry::<u8>::new();
        let second = Registry::<u8>::new();
        let (handle, _sub) = channel(1);
        first.subscribe("shared-name", handle).await;

        assert!(first.contains_event("shared-name").await);
        assert!(matches!(
            second.publish("shared-name", 1).await,
            Err(RegistryError::NotFound { .. })
        ));
    }
}
