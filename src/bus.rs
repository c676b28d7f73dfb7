//! Message bus seam and bounded read primitives
//!
//! The adapter never owns the bus connection: the hosting process hands it a
//! shared [`BusClient`] handle and keeps the connection lifecycle to itself.
//! Everything the adapter reads goes through a [`BoundedGetter`], which turns
//! a subscription-fed value stream into a "latest value or fail after the
//! window" operation, and every state read is additionally anchored to the
//! charger's keepalive topic through a [`TimeoutHandler`].

use crate::error::{ElektraError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Shared, thread-safe publish/subscribe handle
///
/// Implementations must be safe for concurrent use by many adapter instances
/// and other subsystems of the hosting process.
#[async_trait::async_trait]
pub trait BusClient: Send + Sync {
    /// Publish a payload to a topic; fire-and-forget beyond what the
    /// underlying transport reports
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;

    /// Subscribe to a topic, yielding a handle over its most recent payload
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

/// Shared bus handle as passed into adapter constructors
pub type SharedBus = Arc<dyn BusClient>;

/// A payload received on a topic
#[derive(Debug, Clone)]
pub struct Message {
    /// Raw payload bytes as a string (payloads on this bus are JSON text)
    pub payload: String,

    /// Arrival time, used for freshness checks
    pub received_at: Instant,
}

/// Producer half of a topic subscription
///
/// Bus implementations push every received payload into the feed; all
/// subscriptions created from it observe the latest value.
#[derive(Clone)]
pub struct SubscriptionFeed {
    tx: watch::Sender<Option<Message>>,
}

impl SubscriptionFeed {
    /// Create a feed with no value received yet
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Record a newly received payload
    pub fn push<S: Into<String>>(&self, payload: S) {
        self.tx.send_replace(Some(Message {
            payload: payload.into(),
            received_at: Instant::now(),
        }));
    }

    /// Create a consumer handle observing this feed
    pub fn subscribe(&self, topic: &str) -> Subscription {
        Subscription {
            topic: topic.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for SubscriptionFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer handle over the most recent payload on one topic
#[derive(Clone)]
pub struct Subscription {
    topic: String,
    rx: watch::Receiver<Option<Message>>,
}

impl Subscription {
    /// Topic this subscription observes
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Most recent payload, if any arrived yet
    pub fn latest(&self) -> Option<Message> {
        self.rx.borrow().clone()
    }
}

/// Synchronous "latest value or fail" read over a subscription
///
/// `get` resolves to the most recent payload, waiting up to the window for
/// one to appear; past the window it fails with a timeout error naming the
/// topic. With `require_fresh`, payloads older than the window are ignored
/// and a fresh one is awaited instead.
#[derive(Clone)]
pub struct BoundedGetter {
    sub: Subscription,
    window: Duration,
    require_fresh: bool,
}

impl BoundedGetter {
    /// Create a getter accepting any retained value
    pub fn new(sub: Subscription, window: Duration) -> Self {
        Self {
            sub,
            window,
            require_fresh: false,
        }
    }

    /// Reject payloads older than the window
    pub fn require_fresh(mut self) -> Self {
        self.require_fresh = true;
        self
    }

    /// Read timeout window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Get the latest payload or fail after the window
    pub async fn get(&self) -> Result<String> {
        let mut rx = self.sub.rx.clone();
        let deadline = Instant::now() + self.window;

        loop {
            if let Some(msg) = rx.borrow_and_update().clone()
                && (!self.require_fresh || msg.received_at.elapsed() <= self.window)
            {
                return Ok(msg.payload);
            }

            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {
                    return Err(ElektraError::bus(format!(
                        "subscription to {} closed",
                        self.sub.topic
                    )));
                }
                Err(_) => {
                    return Err(ElektraError::timeout(format!(
                        "no value on {} within {:?}",
                        self.sub.topic, self.window
                    )));
                }
            }
        }
    }
}

/// Keepalive-anchored timeout wrapper
///
/// Holds a freshness-checked getter on the charger's keepalive topic and
/// wraps per-topic subscriptions into [`GuardedGetter`]s sharing its window.
pub struct TimeoutHandler {
    anchor: BoundedGetter,
}

impl TimeoutHandler {
    /// Create a handler anchored to the given keepalive subscription
    pub fn new(keepalive: Subscription, window: Duration) -> Self {
        Self {
            anchor: BoundedGetter::new(keepalive, window).require_fresh(),
        }
    }

    /// Wrap a subscription into a guarded getter
    pub fn wrap(&self, sub: Subscription) -> GuardedGetter {
        GuardedGetter {
            inner: BoundedGetter::new(sub, self.anchor.window()),
            anchor: self.anchor.clone(),
        }
    }
}

/// A bounded getter that first proves the device is alive
///
/// The keepalive check catches the offline-charger case for every state
/// topic at once; retained values on the wrapped topic stay valid as long as
/// the device keeps reporting.
#[derive(Clone)]
pub struct GuardedGetter {
    anchor: BoundedGetter,
    inner: BoundedGetter,
}

impl GuardedGetter {
    /// Get the latest payload, failing when the device stopped reporting
    pub async fn get(&self) -> Result<String> {
        self.anchor.get().await.map_err(|_| {
            ElektraError::timeout(format!(
                "charger not reporting on {} within {:?}",
                self.anchor.sub.topic,
                self.anchor.window()
            ))
        })?;

        self.inner.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_and_getter(window_ms: u64) -> (SubscriptionFeed, BoundedGetter) {
        let feed = SubscriptionFeed::new();
        let sub = feed.subscribe("warp/evse/state");
        let getter = BoundedGetter::new(sub, Duration::from_millis(window_ms));
        (feed, getter)
    }

    #[tokio::test]
    async fn get_returns_retained_value() {
        let (feed, getter) = feed_and_getter(50);
        feed.push(r#"{"iec61851_state":1}"#);
        assert_eq!(getter.get().await.unwrap(), r#"{"iec61851_state":1}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn get_times_out_without_value() {
        let (_feed, getter) = feed_and_getter(50);
        let err = getter.get().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("warp/evse/state"));
    }

    #[tokio::test(start_paused = true)]
    async fn get_resolves_when_value_arrives_within_window() {
        let (feed, getter) = feed_and_getter(50);

        let handle = tokio::spawn(async move { getter.get().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        feed.push("late");

        assert_eq!(handle.await.unwrap().unwrap(), "late");
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_getter_rejects_stale_value() {
        let feed = SubscriptionFeed::new();
        let sub = feed.subscribe("warp/evse/low_level_state");
        let getter = BoundedGetter::new(sub, Duration::from_millis(50)).require_fresh();

        feed.push("alive");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = getter.get().await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn stale_value_still_served_without_freshness() {
        let feed = SubscriptionFeed::new();
        let sub = feed.subscribe("warp/users/config");
        feed.push("{}");
        // Non-fresh getters serve retained values regardless of age
        let getter = BoundedGetter::new(sub, Duration::from_millis(10));
        assert_eq!(getter.get().await.unwrap(), "{}");
    }

    #[tokio::test(start_paused = true)]
    async fn guarded_getter_requires_keepalive() {
        let keepalive = SubscriptionFeed::new();
        let state = SubscriptionFeed::new();
        state.push(r#"{"iec61851_state":0}"#);

        let handler = TimeoutHandler::new(
            keepalive.subscribe("warp/evse/low_level_state"),
            Duration::from_millis(50),
        );
        let getter = handler.wrap(state.subscribe("warp/evse/state"));

        // Keepalive silent: the read fails even though state has a value
        let err = getter.get().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("not reporting"));

        // Keepalive fresh: the retained state value is served
        keepalive.push("{}");
        assert_eq!(getter.get().await.unwrap(), r#"{"iec61851_state":0}"#);
    }
}
