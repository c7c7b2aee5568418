//! Session registry and fan-out hub.
//!
//! The hub owns the per-topic retention buffers and the set of live
//! sessions. Publishing appends to the owning topic's buffer and then
//! delivers to every subscribed session; subscribing replays the buffer
//! before any later publish. Both paths hold the same per-topic entry lock,
//! so a session never sees a gap or a duplicate at the replay/live boundary.

use crate::event::Event;
use crate::store::{RetentionPolicy, TopicBuffer};
use crate::TopicId;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Unique identifier for a subscriber session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new session ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("session_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// Session is not registered.
    #[error("Session not registered: {0}")]
    SessionNotRegistered(String),

    /// Maximum subscriptions reached.
    #[error("Maximum subscriptions reached")]
    MaxSubscriptionsReached,

    /// Invalid topic name.
    #[error("Invalid topic name: {0}")]
    InvalidTopic(&'static str),
}

/// Maximum topic name length.
pub const MAX_TOPIC_NAME_LENGTH: usize = 256;

/// Validate a topic name.
///
/// # Errors
///
/// Returns an error message if the topic name is invalid.
pub fn validate_topic_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Topic name cannot be empty");
    }
    if name.len() > MAX_TOPIC_NAME_LENGTH {
        return Err("Topic name too long");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Topic name contains invalid characters");
    }
    Ok(())
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Retained history for the metrics topic.
    pub metrics_capacity: usize,
    /// Retained history for the anomalies topic.
    pub anomalies_capacity: usize,
    /// Retained history for topics created on first use.
    pub default_capacity: usize,
    /// Maximum subscriptions per session.
    pub max_subscriptions_per_session: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            metrics_capacity: 100,
            anomalies_capacity: 20,
            default_capacity: 100,
            max_subscriptions_per_session: 100,
        }
    }
}

/// An item queued for delivery to one session.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Connection acknowledgement, sent once on register.
    Connected { session: SessionId },
    /// A replayed or live event on a subscribed topic.
    Event { topic: TopicId, event: Arc<Event> },
}

/// Per-topic state: retained history plus the subscriber set.
struct TopicEntry {
    buffer: TopicBuffer,
    subscribers: HashSet<SessionId>,
}

impl TopicEntry {
    fn new(policy: RetentionPolicy) -> Self {
        Self {
            buffer: TopicBuffer::new(policy),
            subscribers: HashSet::new(),
        }
    }
}

/// A registered session: its outbound queue and subscription set.
struct SessionHandle {
    tx: mpsc::UnboundedSender<Delivery>,
    topics: HashSet<TopicId>,
}

/// The fan-out hub.
///
/// Shared by the ingestion adapter (publisher) and every session task
/// (subscribers). All methods take `&self`; per-topic and per-session state
/// is guarded by the map entries themselves.
pub struct Hub {
    topics: DashMap<TopicId, TopicEntry>,
    sessions: DashMap<SessionId, SessionHandle>,
    config: HubConfig,
}

impl Hub {
    /// Create a hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration.
    ///
    /// The three well-known topics are registered up front; any other topic
    /// is created as a bounded ring on first use.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        debug!("Creating hub with config: {:?}", config);
        let topics = DashMap::new();
        topics.insert(
            crate::topic::METRICS.to_string(),
            TopicEntry::new(RetentionPolicy::Bounded(config.metrics_capacity)),
        );
        topics.insert(
            crate::topic::ANOMALIES.to_string(),
            TopicEntry::new(RetentionPolicy::Bounded(config.anomalies_capacity)),
        );
        topics.insert(
            crate::topic::SERVICE_HEALTH.to_string(),
            TopicEntry::new(RetentionPolicy::LatestByKey),
        );
        Self {
            topics,
            sessions: DashMap::new(),
            config,
        }
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            topic_count: self.topics.len(),
            session_count: self.sessions.len(),
            total_subscriptions: self.sessions.iter().map(|s| s.topics.len()).sum(),
        }
    }

    /// Register a session and return its delivery queue.
    ///
    /// The connection acknowledgement is enqueued before the handle becomes
    /// visible to publishers, so it is always the first delivery.
    pub fn register(&self, session_id: SessionId) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Delivery::Connected {
            session: session_id.clone(),
        });

        let handle = SessionHandle {
            tx,
            topics: HashSet::new(),
        };
        if self.sessions.insert(session_id.clone(), handle).is_some() {
            warn!(session = %session_id, "Replaced existing session handle");
        }

        debug!(session = %session_id, "Session registered");
        rx
    }

    /// Remove a session and detach it from every topic.
    ///
    /// Idempotent: unregistering twice is a no-op. Has no effect on topic
    /// buffers or on other sessions.
    pub fn unregister(&self, session_id: &SessionId) {
        let Some((_, handle)) = self.sessions.remove(session_id) else {
            return;
        };

        for topic in &handle.topics {
            if let Some(mut entry) = self.topics.get_mut(topic) {
                entry.subscribers.remove(session_id);
            }
        }

        debug!(session = %session_id, "Session unregistered");
    }

    /// Subscribe a session to a topic, replaying the retained history.
    ///
    /// The full snapshot is enqueued, oldest first, before any event
    /// published after this call. Subscribing twice is idempotent: the
    /// second call replays nothing.
    ///
    /// Returns the number of replayed events.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown, the topic name is
    /// invalid, or the subscription limit is reached.
    pub fn subscribe(&self, session_id: &SessionId, topic: &str) -> Result<usize, HubError> {
        validate_topic_name(topic).map_err(HubError::InvalidTopic)?;

        // Record the membership and grab the queue before touching the
        // topic entry; never hold both locks at once.
        let tx = {
            let mut handle = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| HubError::SessionNotRegistered(session_id.to_string()))?;

            if handle.topics.contains(topic) {
                trace!(session = %session_id, topic = %topic, "Already subscribed");
                return Ok(0);
            }
            if handle.topics.len() >= self.config.max_subscriptions_per_session {
                return Err(HubError::MaxSubscriptionsReached);
            }
            handle.topics.insert(topic.to_string());
            handle.tx.clone()
        };

        // Snapshot and replay under the topic entry lock: a concurrent
        // publish for this topic cannot interleave, so the replayed history
        // and subsequent live events form one gapless sequence.
        let mut entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| self.default_entry(topic));
        entry.subscribers.insert(session_id.clone());

        let snapshot = entry.buffer.snapshot();
        let replayed = snapshot.len();
        for event in snapshot {
            if tx
                .send(Delivery::Event {
                    topic: topic.to_string(),
                    event,
                })
                .is_err()
            {
                // Session receiver already dropped; membership is cleaned
                // up by the caller's unregister on disconnect.
                break;
            }
        }

        debug!(
            session = %session_id,
            topic = %topic,
            replayed,
            subscribers = entry.subscribers.len(),
            "Subscribed"
        );

        Ok(replayed)
    }

    /// Unsubscribe a session from a topic.
    ///
    /// No final message is sent; other subscriptions are unaffected.
    /// Lenient: unknown sessions or memberships are a no-op.
    pub fn unsubscribe(&self, session_id: &SessionId, topic: &str) {
        if let Some(mut handle) = self.sessions.get_mut(session_id) {
            handle.topics.remove(topic);
        }
        if let Some(mut entry) = self.topics.get_mut(topic) {
            entry.subscribers.remove(session_id);
            debug!(
                session = %session_id,
                topic = %topic,
                subscribers = entry.subscribers.len(),
                "Unsubscribed"
            );
        }
    }

    /// Publish an event: append to its topic's buffer, then deliver to every
    /// subscribed session.
    ///
    /// The append is visible before any delivery, so a subscriber replaying
    /// concurrently cannot miss this event. A failed enqueue unregisters
    /// only that session; delivery to the rest proceeds. All subscribed
    /// sessions observe the same per-topic order.
    ///
    /// Returns the number of sessions the event was delivered to.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic().to_string();
        let event = Arc::new(event);

        let mut stale: Vec<SessionId> = Vec::new();
        let delivered = {
            let mut entry = self
                .topics
                .entry(topic.clone())
                .or_insert_with(|| self.default_entry(&topic));
            entry.buffer.append(event.clone());

            let mut delivered = 0;
            for session_id in &entry.subscribers {
                let sent = self.sessions.get(session_id).is_some_and(|handle| {
                    handle
                        .tx
                        .send(Delivery::Event {
                            topic: topic.clone(),
                            event: event.clone(),
                        })
                        .is_ok()
                });
                if sent {
                    delivered += 1;
                } else {
                    stale.push(session_id.clone());
                }
            }
            for session_id in &stale {
                entry.subscribers.remove(session_id);
            }
            delivered
        };

        // Entry lock released; now drop the dead sessions entirely.
        for session_id in stale {
            warn!(session = %session_id, topic = %topic, "Delivery failed, dropping session");
            self.unregister(&session_id);
        }

        trace!(topic = %topic, recipients = delivered, "Published event");
        delivered
    }

    /// Point-in-time snapshot of a topic's retained history.
    ///
    /// Read surface for the REST endpoints; returns an empty list for
    /// unknown topics.
    #[must_use]
    pub fn snapshot(&self, topic: &str) -> Vec<Arc<Event>> {
        self.topics
            .get(topic)
            .map(|entry| entry.buffer.snapshot())
            .unwrap_or_default()
    }

    /// Check if a session is registered.
    #[must_use]
    pub fn is_registered(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Get the subscriber count for a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|entry| entry.subscribers.len())
            .unwrap_or(0)
    }

    /// The topics a session is subscribed to.
    #[must_use]
    pub fn session_topics(&self, session_id: &SessionId) -> Vec<TopicId> {
        self.sessions
            .get(session_id)
            .map(|handle| handle.topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn default_entry(&self, topic: &str) -> TopicEntry {
        debug!(topic = %topic, "Creating topic on first use");
        TopicEntry::new(RetentionPolicy::Bounded(self.config.default_capacity))
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Number of topics with state.
    pub topic_count: usize,
    /// Number of registered sessions.
    pub session_count: usize,
    /// Total subscriptions across all sessions.
    pub total_subscriptions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MetricKind, MetricSample};
    use crate::topic;

    fn metric(id: &str) -> Event {
        Event::Metric(MetricSample {
            id: id.into(),
            timestamp: 1,
            service: "auth-service".into(),
            metric: MetricKind::CpuUsage,
            value: 50.0,
            host: "host-1".into(),
            region: "us-east".into(),
        })
    }

    fn event_id(delivery: &Delivery) -> String {
        match delivery {
            Delivery::Event { event, .. } => match event.as_ref() {
                Event::Metric(s) => s.id.clone(),
                Event::Anomaly(a) => a.id.clone(),
                Event::Health(h) => h.service.clone(),
            },
            Delivery::Connected { .. } => panic!("expected event delivery"),
        }
    }

    #[tokio::test]
    async fn test_register_sends_ack_first() {
        let hub = Hub::new();
        let id = SessionId::from("s1");
        let mut rx = hub.register(id.clone());

        match rx.recv().await.unwrap() {
            Delivery::Connected { session } => assert_eq!(session, id),
            other => panic!("expected ack, got {other:?}"),
        }
        assert!(hub.is_registered(&id));
    }

    #[tokio::test]
    async fn test_subscribe_replays_then_live() {
        let hub = Hub::with_config(HubConfig {
            metrics_capacity: 2,
            ..HubConfig::default()
        });
        let id = SessionId::from("s1");
        let mut rx = hub.register(id.clone());
        rx.recv().await.unwrap(); // ack

        hub.publish(metric("e1"));
        hub.publish(metric("e2"));
        hub.publish(metric("e3"));

        let replayed = hub.subscribe(&id, topic::METRICS).unwrap();
        assert_eq!(replayed, 2);

        hub.publish(metric("e4"));

        assert_eq!(event_id(&rx.recv().await.unwrap()), "e2");
        assert_eq!(event_id(&rx.recv().await.unwrap()), "e3");
        assert_eq!(event_id(&rx.recv().await.unwrap()), "e4");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let hub = Hub::new();
        let id = SessionId::from("s1");
        let mut rx = hub.register(id.clone());
        rx.recv().await.unwrap();

        hub.publish(metric("e1"));
        assert_eq!(hub.subscribe(&id, topic::METRICS).unwrap(), 1);
        assert_eq!(hub.subscribe(&id, topic::METRICS).unwrap(), 0);

        // Exactly one replay of e1.
        assert_eq!(event_id(&rx.recv().await.unwrap()), "e1");
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.subscriber_count(topic::METRICS), 1);
    }

    #[tokio::test]
    async fn test_sessions_observe_same_order() {
        let hub = Hub::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        let mut rx_a = hub.register(a.clone());
        let mut rx_b = hub.register(b.clone());
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        hub.subscribe(&a, topic::METRICS).unwrap();
        hub.subscribe(&b, topic::METRICS).unwrap();

        for i in 0..5 {
            hub.publish(metric(&format!("e{i}")));
        }
        for i in 0..5 {
            let expected = format!("e{i}");
            assert_eq!(event_id(&rx_a.recv().await.unwrap()), expected);
            assert_eq!(event_id(&rx_b.recv().await.unwrap()), expected);
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_leaves_other_topics_active() {
        let hub = Hub::new();
        let id = SessionId::from("s1");
        let mut rx = hub.register(id.clone());
        rx.recv().await.unwrap();

        hub.subscribe(&id, topic::METRICS).unwrap();
        hub.subscribe(&id, "/topic/custom").unwrap();
        hub.unsubscribe(&id, topic::METRICS);

        hub.publish(metric("dropped"));
        assert!(rx.try_recv().is_err());

        // The custom topic still delivers.
        assert_eq!(hub.subscriber_count("/topic/custom"), 1);
        assert_eq!(hub.session_topics(&id), vec!["/topic/custom".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_delivery_drops_only_that_session() {
        let hub = Hub::new();
        let dead = SessionId::from("dead");
        let live = SessionId::from("live");
        let rx_dead = hub.register(dead.clone());
        let mut rx_live = hub.register(live.clone());
        rx_live.recv().await.unwrap();

        hub.subscribe(&dead, topic::METRICS).unwrap();
        hub.subscribe(&live, topic::METRICS).unwrap();

        drop(rx_dead);
        let delivered = hub.publish(metric("e1"));

        assert_eq!(delivered, 1);
        assert_eq!(event_id(&rx_live.recv().await.unwrap()), "e1");
        assert!(!hub.is_registered(&dead));
        assert!(hub.is_registered(&live));
        assert_eq!(hub.subscriber_count(topic::METRICS), 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent_and_keeps_buffers() {
        let hub = Hub::new();
        let id = SessionId::from("s1");
        let _rx = hub.register(id.clone());
        hub.subscribe(&id, topic::METRICS).unwrap();
        hub.publish(metric("e1"));

        hub.unregister(&id);
        hub.unregister(&id);

        assert!(!hub.is_registered(&id));
        assert_eq!(hub.subscriber_count(topic::METRICS), 0);
        // Retained history survives the session.
        assert_eq!(hub.snapshot(topic::METRICS).len(), 1);
    }

    #[test]
    fn test_subscribe_unknown_session() {
        let hub = Hub::new();
        assert!(matches!(
            hub.subscribe(&SessionId::from("ghost"), topic::METRICS),
            Err(HubError::SessionNotRegistered(_))
        ));
    }

    #[test]
    fn test_subscription_limit() {
        let hub = Hub::with_config(HubConfig {
            max_subscriptions_per_session: 1,
            ..HubConfig::default()
        });
        let id = SessionId::from("s1");
        let _rx = hub.register(id.clone());

        hub.subscribe(&id, topic::METRICS).unwrap();
        assert!(matches!(
            hub.subscribe(&id, topic::ANOMALIES),
            Err(HubError::MaxSubscriptionsReached)
        ));
    }

    #[test]
    fn test_topic_name_validation() {
        assert!(validate_topic_name("/topic/metrics").is_ok());
        assert!(validate_topic_name("").is_err());
        let long = "a".repeat(MAX_TOPIC_NAME_LENGTH + 1);
        assert!(validate_topic_name(&long).is_err());
    }

    #[test]
    fn test_stats() {
        let hub = Hub::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        let _rx_a = hub.register(a.clone());
        let _rx_b = hub.register(b.clone());

        hub.subscribe(&a, topic::METRICS).unwrap();
        hub.subscribe(&a, topic::ANOMALIES).unwrap();
        hub.subscribe(&b, topic::METRICS).unwrap();

        let stats = hub.stats();
        assert_eq!(stats.topic_count, 3);
        assert_eq!(stats.session_count, 2);
        assert_eq!(stats.total_subscriptions, 3);
    }
}
