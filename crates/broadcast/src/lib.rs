// Rust guideline compliant 2026-10-19

//! Live-feed hub: fans every [`LiveEvent`] out to all registered observers.
//!
//! [`BroadcastHub::publish`] snapshots the subscriber registry, then delivers
//! to each observer concurrently with a per-subscriber timeout. Observers that
//! fail or time out are evicted; the others are unaffected. Registration and
//! removal may happen concurrently with a publish and never invalidate the
//! snapshot being delivered.
//!
//! [`ChannelSubscriber`] is the in-process observer: a bounded tokio channel
//! whose receiver can be drained by a transport task or a test.

use dashmap::DashMap;
use domain::{DeliveryError, LiveEvent, Subscriber};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// HubError
// ---------------------------------------------------------------------------

/// Errors raised by the hub.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The supplied configuration is invalid.
    #[error("invalid hub configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The registry already holds `max_subscribers` observers.
    #[error("subscriber limit reached (max: {max})")]
    Full {
        /// Configured limit.
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// HubConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`BroadcastHub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Upper bound for delivering one event to one observer.
    pub delivery_timeout: Duration,
    /// Maximum number of registered observers.
    pub max_subscribers: usize,
}

/// Builder for [`HubConfig`].
#[derive(Debug)]
pub struct HubConfigBuilder {
    delivery_timeout: Duration,
    max_subscribers: usize,
}

impl HubConfig {
    /// Create a builder.
    ///
    /// Default values: `delivery_timeout = 2 s`, `max_subscribers = 1024`.
    #[must_use]
    pub fn builder() -> HubConfigBuilder {
        HubConfigBuilder { delivery_timeout: Duration::from_secs(2), max_subscribers: 1024 }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { delivery_timeout: Duration::from_secs(2), max_subscribers: 1024 }
    }
}

impl HubConfigBuilder {
    /// Override the per-subscriber delivery timeout.
    #[must_use]
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Override the subscriber limit.
    #[must_use]
    pub fn max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidConfig`] when the timeout or the limit is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<HubConfig, HubError> {
        if self.delivery_timeout.is_zero() {
            return Err(HubError::InvalidConfig { reason: "delivery_timeout must be > 0".to_owned() });
        }
        if self.max_subscribers == 0 {
            return Err(HubError::InvalidConfig { reason: "max_subscribers must be >= 1".to_owned() });
        }
        Ok(HubConfig { delivery_timeout: self.delivery_timeout, max_subscribers: self.max_subscribers })
    }
}

// ---------------------------------------------------------------------------
// SubscriberId / PublishReport
// ---------------------------------------------------------------------------

/// Handle returned by [`BroadcastHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    /// Observers that accepted the event.
    pub delivered: usize,
    /// Observers that failed and were evicted.
    pub evicted: usize,
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

/// Registry of live observers.
pub struct BroadcastHub<S> {
    subscribers: DashMap<SubscriberId, Arc<S>>,
    // Slots reserved against `max_subscribers`; taken before insert.
    reserved: AtomicUsize,
    next_id: AtomicU64,
    config: HubConfig,
}

impl<S> fmt::Debug for BroadcastHub<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("subscribers", &self.subscribers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: Subscriber> BroadcastHub<S> {
    /// Create an empty hub.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self { subscribers: DashMap::new(), reserved: AtomicUsize::new(0), next_id: AtomicU64::new(1), config }
    }

    /// Register `subscriber`; it receives every event published afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Full`] when `max_subscribers` is reached.
    pub fn subscribe(&self, subscriber: S) -> Result<SubscriberId, HubError> {
        let max = self.config.max_subscribers;
        if self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_err()
        {
            tracing::warn!(max, "hub.full");
            return Err(HubError::Full { max });
        }
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.insert(id, Arc::new(subscriber));
        tracing::info!(subscriber = %id, total = self.subscribers.len(), "hub.subscribed");
        Ok(id)
    }

    /// Remove `id`. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.remove(id);
        if removed {
            tracing::info!(subscriber = %id, total = self.subscribers.len(), "hub.unsubscribed");
        }
        removed
    }

    fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// `true` when nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver `event` to every observer registered at call time.
    ///
    /// Observers that fail or exceed `delivery_timeout` are evicted.
    pub async fn publish(&self, event: Arc<LiveEvent>) -> PublishReport {
        // Clone the handles out so no shard lock is held across an await.
        let snapshot: Vec<(SubscriberId, Arc<S>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        if snapshot.is_empty() {
            return PublishReport::default();
        }

        let timeout = self.config.delivery_timeout;
        let deliveries: Vec<_> = snapshot
            .into_iter()
            .map(|(id, subscriber)| deliver_one(id, subscriber, Arc::clone(&event), timeout))
            .collect();

        let mut report = PublishReport::default();
        for (id, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    if self.remove(id) {
                        report.evicted += 1;
                    }
                    tracing::debug!(subscriber = %id, error = %e, "hub.evicted");
                }
            }
        }
        tracing::debug!(
            transaction_id = %event.transaction.id,
            delivered = report.delivered,
            evicted = report.evicted,
            "hub.published"
        );
        report
    }
}

async fn deliver_one<S: Subscriber>(
    id: SubscriberId,
    subscriber: Arc<S>,
    event: Arc<LiveEvent>,
    timeout: Duration,
) -> (SubscriberId, Result<(), DeliveryError>) {
    let outcome = match tokio::time::timeout(timeout, subscriber.deliver(event)).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => Err(DeliveryError::TimedOut),
    };
    (id, outcome)
}

// ---------------------------------------------------------------------------
// ChannelSubscriber
// ---------------------------------------------------------------------------

/// Observer backed by a bounded tokio channel.
///
/// A full channel makes `deliver` wait, so a reader that stops draining is
/// eventually evicted by the hub's timeout. Dropping the receiver evicts on
/// the next publish.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::Sender<Arc<LiveEvent>>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiver that yields its events.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<LiveEvent>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Subscriber for ChannelSubscriber {
    async fn deliver(&self, event: Arc<LiveEvent>) -> Result<(), DeliveryError> {
        self.tx.send(event).await.map_err(|_receiver_dropped| DeliveryError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use domain::{Action, NewTransaction, RiskAssessment, RiskTier, SignalBreakdown};

    fn event(id: &str) -> Arc<LiveEvent> {
        let now = NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap();
        let transaction = NewTransaction { id: Some(id.to_owned()), amount: 99.0, ..NewTransaction::default() }
            .into_transaction(now);
        let assessment = RiskAssessment {
            score: 8.0,
            tier: RiskTier::Low,
            action: Action::Allow,
            signals: SignalBreakdown {
                classifier_prob: 0.05,
                anomaly_score: 0.01,
                anomaly_threshold: 0.05,
                is_anomaly: false,
                classifier_component: 3.0,
                anomaly_component: 0.5,
                rule_component: 0.0,
                rules: Vec::new(),
            },
            attributions: Vec::new(),
            rationale: "Transaction amount".to_owned(),
            model_version: "test".to_owned(),
        };
        Arc::new(LiveEvent { transaction, assessment, challenge_issued: false, processed_at: Utc::now() })
    }

    fn hub() -> BroadcastHub<ChannelSubscriber> {
        BroadcastHub::new(HubConfig::default())
    }

    // ------------------------------------------------------------------
    // Config
    // ------------------------------------------------------------------

    #[test]
    fn config_defaults() {
        assert_eq!(HubConfig::builder().build().unwrap(), HubConfig::default());
    }

    #[test]
    fn config_rejects_zero_timeout() {
        let result = HubConfig::builder().delivery_timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(HubError::InvalidConfig { .. })));
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    #[test]
    fn subscribe_and_unsubscribe() {
        let hub = hub();
        let (a, _rx_a) = ChannelSubscriber::channel(4);
        let (b, _rx_b) = ChannelSubscriber::channel(4);
        let id_a = hub.subscribe(a).unwrap();
        let id_b = hub.subscribe(b).unwrap();
        assert_ne!(id_a, id_b);
        assert_eq!(hub.len(), 2);

        assert!(hub.unsubscribe(id_a));
        assert!(!hub.unsubscribe(id_a));
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn subscriber_limit_is_enforced() {
        let hub = BroadcastHub::new(HubConfig::builder().max_subscribers(1).build().unwrap());
        let (a, _rx_a) = ChannelSubscriber::channel(1);
        let (b, _rx_b) = ChannelSubscriber::channel(1);
        hub.subscribe(a).unwrap();
        assert_eq!(hub.subscribe(b), Err(HubError::Full { max: 1 }));
    }

    #[test]
    fn concurrent_subscribes_never_exceed_limit() {
        let hub = BroadcastHub::new(HubConfig::builder().max_subscribers(8).build().unwrap());
        let accepted = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..64)
                .map(|_| {
                    scope.spawn(|| {
                        let (s, _rx) = ChannelSubscriber::channel(1);
                        hub.subscribe(s).is_ok()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).filter(|&ok| ok).count()
        });
        assert_eq!(accepted, 8);
        assert_eq!(hub.len(), 8);
    }

    #[tokio::test]
    async fn evicted_slot_can_be_reused() {
        let hub = BroadcastHub::new(HubConfig::builder().max_subscribers(1).build().unwrap());
        let (gone, rx_gone) = ChannelSubscriber::channel(1);
        hub.subscribe(gone).unwrap();
        drop(rx_gone);
        assert_eq!(hub.publish(event("T1")).await.evicted, 1);

        let (next, _rx_next) = ChannelSubscriber::channel(1);
        assert!(hub.subscribe(next).is_ok());
    }

    // ------------------------------------------------------------------
    // Publish
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn every_subscriber_receives_each_event() {
        let hub = hub();
        let (a, mut rx_a) = ChannelSubscriber::channel(4);
        let (b, mut rx_b) = ChannelSubscriber::channel(4);
        hub.subscribe(a).unwrap();
        hub.subscribe(b).unwrap();

        let report = hub.publish(event("T1")).await;

        assert_eq!(report, PublishReport { delivered: 2, evicted: 0 });
        assert_eq!(rx_a.recv().await.unwrap().transaction.id, "T1");
        assert_eq!(rx_b.recv().await.unwrap().transaction.id, "T1");
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let hub = hub();
        let (a, mut rx) = ChannelSubscriber::channel(8);
        hub.subscribe(a).unwrap();
        for id in ["T1", "T2", "T3"] {
            hub.publish(event(id)).await;
        }
        for id in ["T1", "T2", "T3"] {
            assert_eq!(rx.recv().await.unwrap().transaction.id, id);
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        assert_eq!(hub().publish(event("T1")).await, PublishReport::default());
    }

    #[tokio::test]
    async fn closed_subscriber_is_evicted_and_others_still_served() {
        let hub = hub();
        let (gone, rx_gone) = ChannelSubscriber::channel(4);
        let (live, mut rx_live) = ChannelSubscriber::channel(4);
        hub.subscribe(gone).unwrap();
        hub.subscribe(live).unwrap();
        drop(rx_gone);

        let report = hub.publish(event("T1")).await;

        assert_eq!(report, PublishReport { delivered: 1, evicted: 1 });
        assert_eq!(hub.len(), 1);
        assert_eq!(rx_live.recv().await.unwrap().transaction.id, "T1");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_subscriber_times_out_and_is_evicted() {
        let hub = hub();
        let (slow, _rx_slow) = ChannelSubscriber::channel(1);
        let (fast, mut rx_fast) = ChannelSubscriber::channel(4);
        hub.subscribe(slow).unwrap();
        hub.subscribe(fast).unwrap();

        // Fills the slow channel.
        assert_eq!(hub.publish(event("T1")).await.delivered, 2);
        // The slow reader never drains, so this delivery waits until the timeout.
        let report = hub.publish(event("T2")).await;

        assert_eq!(report, PublishReport { delivered: 1, evicted: 1 });
        assert_eq!(rx_fast.recv().await.unwrap().transaction.id, "T1");
        assert_eq!(rx_fast.recv().await.unwrap().transaction.id, "T2");
    }
}
