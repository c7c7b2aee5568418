//! Typed telemetry records for Vantage.
//!
//! These are the payloads flowing from the upstream log through the hub to
//! subscriber sessions. Records are immutable once created; a new
//! [`HealthRecord`] for a service supersedes the previous one.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Well-known metric names, open-ended for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CpuUsage,
    MemoryUsage,
    ResponseTime,
    ErrorCount,
    RequestCount,
    /// Any metric name this build does not know about yet.
    #[serde(untagged)]
    Other(String),
}

impl MetricKind {
    /// Get the metric name as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            MetricKind::CpuUsage => "cpu_usage",
            MetricKind::MemoryUsage => "memory_usage",
            MetricKind::ResponseTime => "response_time",
            MetricKind::ErrorCount => "error_count",
            MetricKind::RequestCount => "request_count",
            MetricKind::Other(name) => name,
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anomaly severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Service health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// A single metric observation from one host of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Opaque unique identifier.
    pub id: String,
    /// Epoch milliseconds.
    pub timestamp: u64,
    /// Emitting service.
    pub service: String,
    /// Metric name.
    pub metric: MetricKind,
    /// Observed value.
    pub value: f64,
    /// Emitting host.
    pub host: String,
    /// Deployment region.
    pub region: String,
}

/// A metric sample that breached an anomaly rule at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub id: String,
    pub timestamp: u64,
    pub service: String,
    pub metric: MetricKind,
    pub value: f64,
    pub host: String,
    pub region: String,
    /// Value the detector expected.
    pub expected_value: f64,
    /// Fractional deviation from the expected value.
    pub deviation: f64,
    pub severity: Severity,
}

/// Aggregated health snapshot for one service.
///
/// Replacement semantics: a newer record for the same `service` supersedes
/// the older one; no per-service history is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub service: String,
    pub timestamp: u64,
    pub status: HealthStatus,
    pub metrics_count: u64,
    pub anomalies_count: u64,
    pub avg_response_time: f64,
    pub avg_cpu_usage: f64,
    pub avg_memory_usage: f64,
}

/// A typed event routed through the hub.
///
/// Serializes untagged: the wire payload is the record itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    Metric(MetricSample),
    Anomaly(AnomalyEvent),
    Health(HealthRecord),
}

impl Event {
    /// The broadcast topic this event belongs to.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Event::Metric(_) => crate::topic::METRICS,
            Event::Anomaly(_) => crate::topic::ANOMALIES,
            Event::Health(_) => crate::topic::SERVICE_HEALTH,
        }
    }

    /// The service this event concerns. Used as the retention key for
    /// latest-per-key topics.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Event::Metric(s) => &s.service,
            Event::Anomaly(a) => &a.service,
            Event::Health(h) => &h.service,
        }
    }

    /// Event timestamp in epoch milliseconds.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        match self {
            Event::Metric(s) => s.timestamp,
            Event::Anomaly(a) => a.timestamp,
            Event::Health(h) => h.timestamp,
        }
    }

    /// Serialize the inner record for a session frame body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_body(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<MetricSample> for Event {
    fn from(sample: MetricSample) -> Self {
        Event::Metric(sample)
    }
}

impl From<AnomalyEvent> for Event {
    fn from(anomaly: AnomalyEvent) -> Self {
        Event::Anomaly(anomaly)
    }
}

impl From<HealthRecord> for Event {
    fn from(record: HealthRecord) -> Self {
        Event::Health(record)
    }
}
