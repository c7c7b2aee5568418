//! Per-topic retention buffers.
//!
//! A [`TopicBuffer`] holds the recent history replayed to a session on
//! subscribe. Bounded topics keep a FIFO ring and evict oldest-first; the
//! health topic keeps exactly one record per service key.

use crate::event::Event;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// How a topic retains events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep at most N events, evicting oldest-first on overflow.
    Bounded(usize),
    /// Keep the latest event per `service` key.
    LatestByKey,
}

/// Retained history for a single topic.
///
/// Not internally synchronized; the hub serializes access per topic.
#[derive(Debug)]
pub enum TopicBuffer {
    Ring {
        entries: VecDeque<Arc<Event>>,
        capacity: usize,
    },
    Latest {
        entries: BTreeMap<String, Arc<Event>>,
    },
}

impl TopicBuffer {
    /// Create a buffer for the given retention policy.
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        match policy {
            RetentionPolicy::Bounded(capacity) => TopicBuffer::Ring {
                entries: VecDeque::with_capacity(capacity),
                capacity,
            },
            RetentionPolicy::LatestByKey => TopicBuffer::Latest {
                entries: BTreeMap::new(),
            },
        }
    }

    /// Insert an event at the tail, evicting or replacing per policy.
    ///
    /// Never contacts sessions; retention only.
    pub fn append(&mut self, event: Arc<Event>) {
        match self {
            TopicBuffer::Ring { entries, capacity } => {
                if *capacity == 0 {
                    return;
                }
                if entries.len() == *capacity {
                    entries.pop_front();
                }
                entries.push_back(event);
            }
            TopicBuffer::Latest { entries } => {
                entries.insert(event.service().to_string(), event);
            }
        }
    }

    /// Point-in-time copy of the retained events.
    ///
    /// Oldest first for bounded topics; sorted by service key for the
    /// latest-per-key map.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        match self {
            TopicBuffer::Ring { entries, .. } => entries.iter().cloned().collect(),
            TopicBuffer::Latest { entries } => entries.values().cloned().collect(),
        }
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            TopicBuffer::Ring { entries, .. } => entries.len(),
            TopicBuffer::Latest { entries } => entries.len(),
        }
    }

    /// Check whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{HealthRecord, HealthStatus, MetricKind, MetricSample};

    fn metric(id: &str, service: &str) -> Arc<Event> {
        Arc::new(Event::Metric(MetricSample {
            id: id.into(),
            timestamp: 1,
            service: service.into(),
            metric: MetricKind::CpuUsage,
            value: 1.0,
            host: "host-1".into(),
            region: "us-east".into(),
        }))
    }

    fn health(service: &str, timestamp: u64) -> Arc<Event> {
        Arc::new(Event::Health(HealthRecord {
            service: service.into(),
            timestamp,
            status: HealthStatus::Healthy,
            metrics_count: 1,
            anomalies_count: 0,
            avg_response_time: 0.0,
            avg_cpu_usage: 0.0,
            avg_memory_usage: 0.0,
        }))
    }

    #[test]
    fn test_ring_evicts_oldest_first() {
        let mut buffer = TopicBuffer::new(RetentionPolicy::Bounded(2));
        buffer.append(metric("e1", "a"));
        buffer.append(metric("e2", "a"));
        buffer.append(metric("e3", "a"));

        let ids: Vec<_> = buffer
            .snapshot()
            .iter()
            .map(|e| match e.as_ref() {
                Event::Metric(s) => s.id.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec!["e2", "e3"]);
    }

    #[test]
    fn test_ring_never_exceeds_capacity() {
        let mut buffer = TopicBuffer::new(RetentionPolicy::Bounded(5));
        for i in 0..100 {
            buffer.append(metric(&format!("e{i}"), "a"));
        }
        assert_eq!(buffer.len(), 5);
        // Most-recently-appended entries, in arrival order.
        let first = buffer.snapshot()[0].clone();
        assert!(matches!(first.as_ref(), Event::Metric(s) if s.id == "e95"));
    }

    #[test]
    fn test_latest_replaces_per_service() {
        let mut buffer = TopicBuffer::new(RetentionPolicy::LatestByKey);
        buffer.append(health("a", 1));
        buffer.append(health("b", 2));
        buffer.append(health("a", 3));

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 2);
        let a = snapshot
            .iter()
            .find(|e| e.service() == "a")
            .expect("service a retained");
        assert_eq!(a.timestamp(), 3);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut buffer = TopicBuffer::new(RetentionPolicy::Bounded(4));
        buffer.append(metric("e1", "a"));
        let snapshot = buffer.snapshot();
        buffer.append(metric("e2", "a"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(buffer.len(), 2);
    }
}
