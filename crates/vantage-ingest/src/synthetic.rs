//! Synthetic upstream source.
//!
//! Stands in for the real partitioned log during development and demos:
//! every interval it emits one metric sample per service/metric pair,
//! occasionally spiking values, and derives anomaly alerts and per-service
//! health snapshots from the same demo fleet.

use crate::source::{IngestError, TopicStream, UpstreamSource};
use crate::upstream_topic;
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;
use vantage_core::event::{
    now_millis, AnomalyEvent, HealthRecord, HealthStatus, MetricKind, MetricSample, Severity,
};

const SERVICES: [&str; 5] = [
    "api-gateway",
    "auth-service",
    "payment-service",
    "user-service",
    "order-service",
];

const METRICS: [MetricKind; 5] = [
    MetricKind::CpuUsage,
    MetricKind::MemoryUsage,
    MetricKind::ResponseTime,
    MetricKind::ErrorCount,
    MetricKind::RequestCount,
];

/// Chance that a generated value is tripled to simulate an anomaly.
const SPIKE_PROBABILITY: f64 = 0.05;

/// Synthetic source configuration.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Interval between generated batches.
    pub interval: Duration,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Generator-backed [`UpstreamSource`].
#[derive(Debug, Default)]
pub struct SyntheticSource {
    config: SyntheticConfig,
}

impl SyntheticSource {
    /// Create a synthetic source with the given configuration.
    #[must_use]
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl UpstreamSource for SyntheticSource {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn TopicStream>, IngestError> {
        let kind = match topic {
            upstream_topic::METRICS_DATA => StreamKind::Metrics,
            upstream_topic::ALERTS => StreamKind::Alerts,
            upstream_topic::SERVICE_HEALTH => StreamKind::Health,
            other => return Err(IngestError::UnknownTopic(other.to_string())),
        };
        debug!(topic = %topic, "Synthetic stream opened");
        Ok(Box::new(SyntheticStream {
            kind,
            ticker: tokio::time::interval(self.config.interval),
            pending: VecDeque::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Metrics,
    Alerts,
    Health,
}

struct SyntheticStream {
    kind: StreamKind,
    ticker: tokio::time::Interval,
    pending: VecDeque<Bytes>,
}

#[async_trait]
impl TopicStream for SyntheticStream {
    async fn next(&mut self) -> Result<Option<Bytes>, IngestError> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return Ok(Some(payload));
            }
            self.ticker.tick().await;
            self.generate_batch();
        }
    }

    async fn release(&mut self) -> Result<(), IngestError> {
        self.pending.clear();
        Ok(())
    }
}

impl SyntheticStream {
    fn generate_batch(&mut self) {
        match self.kind {
            StreamKind::Metrics => {
                for sample in generate_samples() {
                    self.push(&sample);
                }
            }
            StreamKind::Alerts => {
                for sample in generate_samples() {
                    if let Some(anomaly) = derive_anomaly(&sample) {
                        self.push(&anomaly);
                    }
                }
            }
            StreamKind::Health => {
                for service in SERVICES {
                    self.push(&generate_health(service));
                }
            }
        }
    }

    fn push<T: serde::Serialize>(&mut self, record: &T) {
        // Serialization of our own records cannot fail.
        if let Ok(raw) = serde_json::to_vec(record) {
            self.pending.push_back(Bytes::from(raw));
        }
    }
}

fn generate_samples() -> Vec<MetricSample> {
    let mut rng = rand::rng();
    let mut samples = Vec::with_capacity(SERVICES.len() * METRICS.len());

    for service in SERVICES {
        for metric in METRICS {
            let mut value = match metric {
                MetricKind::CpuUsage => rng.random_range(10.0..100.0),
                MetricKind::MemoryUsage => rng.random_range(20.0..90.0),
                MetricKind::ResponseTime => rng.random_range(10.0..1000.0),
                MetricKind::ErrorCount => rng.random_range(0..10) as f64,
                MetricKind::RequestCount => rng.random_range(10..1000) as f64,
                MetricKind::Other(_) => rng.random_range(0.0..100.0),
            };
            if rng.random_bool(SPIKE_PROBABILITY) {
                value *= 3.0;
            }

            samples.push(MetricSample {
                id: uuid::Uuid::new_v4().to_string(),
                timestamp: now_millis(),
                service: service.to_string(),
                metric,
                value,
                host: format!("host-{}", rng.random_range(1..=5)),
                region: if rng.random_bool(0.5) {
                    "us-east".to_string()
                } else {
                    "us-west".to_string()
                },
            });
        }
    }

    samples
}

/// Hard anomaly thresholds per metric.
const THRESHOLDS: [(MetricKind, f64); 3] = [
    (MetricKind::CpuUsage, 90.0),
    (MetricKind::ResponseTime, 500.0),
    (MetricKind::ErrorCount, 5.0),
];

/// Grade one breached threshold by its exceedance ratio.
fn grade(value: f64, threshold: f64) -> Severity {
    let ratio = value / threshold;
    if ratio >= 1.5 {
        Severity::High
    } else if ratio >= 1.2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Severity for a sample, if any rule flags it.
///
/// When a sample qualifies under several rules at once, the highest graded
/// severity wins.
fn severity_for(sample: &MetricSample) -> Option<Severity> {
    THRESHOLDS
        .iter()
        .filter(|(metric, threshold)| sample.metric == *metric && sample.value > *threshold)
        .map(|(_, threshold)| grade(sample.value, *threshold))
        .max()
}

fn derive_anomaly(sample: &MetricSample) -> Option<AnomalyEvent> {
    let severity = severity_for(sample)?;
    Some(AnomalyEvent {
        id: sample.id.clone(),
        timestamp: sample.timestamp,
        service: sample.service.clone(),
        metric: sample.metric.clone(),
        value: sample.value,
        host: sample.host.clone(),
        region: sample.region.clone(),
        expected_value: sample.value / 3.0,
        deviation: 2.0,
        severity,
    })
}

fn generate_health(service: &str) -> HealthRecord {
    let mut rng = rand::rng();
    let roll: f64 = rng.random_range(0.0..1.0);
    let status = if roll > 0.8 {
        HealthStatus::Critical
    } else if roll > 0.6 {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };

    HealthRecord {
        service: service.to_string(),
        timestamp: now_millis(),
        status,
        metrics_count: rng.random_range(10..100),
        anomalies_count: rng.random_range(0..10),
        avg_response_time: rng.random_range(50.0..500.0),
        avg_cpu_usage: rng.random_range(10.0..90.0),
        avg_memory_usage: rng.random_range(20.0..80.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with(metric: MetricKind, value: f64) -> MetricSample {
        MetricSample {
            id: "s-1".into(),
            timestamp: 1,
            service: "auth-service".into(),
            metric,
            value,
            host: "host-1".into(),
            region: "us-east".into(),
        }
    }

    #[test]
    fn test_severity_grading() {
        assert_eq!(
            severity_for(&sample_with(MetricKind::CpuUsage, 91.0)),
            Some(Severity::Low)
        );
        assert_eq!(
            severity_for(&sample_with(MetricKind::CpuUsage, 110.0)),
            Some(Severity::Medium)
        );
        assert_eq!(
            severity_for(&sample_with(MetricKind::ResponseTime, 800.0)),
            Some(Severity::High)
        );
        assert_eq!(severity_for(&sample_with(MetricKind::CpuUsage, 90.0)), None);
        assert_eq!(
            severity_for(&sample_with(MetricKind::RequestCount, 999.0)),
            None
        );
    }

    #[test]
    fn test_derive_anomaly_fields() {
        let sample = sample_with(MetricKind::ErrorCount, 9.0);
        let anomaly = derive_anomaly(&sample).unwrap();
        assert_eq!(anomaly.expected_value, 3.0);
        assert_eq!(anomaly.deviation, 2.0);
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(anomaly.service, sample.service);
    }

    #[test]
    fn test_batch_shapes() {
        let samples = generate_samples();
        assert_eq!(samples.len(), SERVICES.len() * METRICS.len());

        let health = generate_health("api-gateway");
        assert_eq!(health.service, "api-gateway");
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_stream_yields_decodable_samples() {
        let source = SyntheticSource::new(SyntheticConfig {
            interval: Duration::from_millis(100),
        });
        let mut stream = source
            .subscribe(upstream_topic::METRICS_DATA)
            .await
            .unwrap();

        let payload = stream.next().await.unwrap().unwrap();
        let sample: MetricSample = serde_json::from_slice(&payload).unwrap();
        assert!(SERVICES.contains(&sample.service.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_alerts_stream_yields_only_breaches() {
        let source = SyntheticSource::default();
        let mut stream = source.subscribe(upstream_topic::ALERTS).await.unwrap();

        // Anomalies are rare per batch; a few ticks are enough under
        // paused time.
        let payload = stream.next().await.unwrap().unwrap();
        let anomaly: AnomalyEvent = serde_json::from_slice(&payload).unwrap();
        assert!(severity_for(&sample_with(anomaly.metric.clone(), anomaly.value)).is_some());
    }

    #[tokio::test]
    async fn test_unknown_topic_rejected() {
        let source = SyntheticSource::default();
        assert!(matches!(
            source.subscribe("mystery").await,
            Err(IngestError::UnknownTopic(_))
        ));
    }
}
