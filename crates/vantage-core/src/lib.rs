//! # vantage-core
//!
//! Event model, bounded topic retention, and fan-out hub for the Vantage
//! telemetry gateway.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Event** - Typed records for metric samples, anomaly alerts, and
//!   service-health snapshots
//! - **TopicBuffer** - Bounded FIFO / latest-per-key retention per topic
//! - **Hub** - Session registry and per-topic broadcast with history replay
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Ingestion  │────▶│     Hub     │────▶│   Session   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │ TopicBuffer │
//!                     └─────────────┘
//! ```

pub mod event;
pub mod hub;
pub mod store;

pub use event::{AnomalyEvent, Event, HealthRecord, HealthStatus, MetricKind, MetricSample, Severity};
pub use hub::{Delivery, Hub, HubConfig, HubError, HubStats, SessionId};
pub use store::{RetentionPolicy, TopicBuffer};

/// A topic identifier.
pub type TopicId = String;

/// Fixed broadcast topic names exposed to sessions.
pub mod topic {
    /// Metric samples.
    pub const METRICS: &str = "/topic/metrics";
    /// Anomaly alerts.
    pub const ANOMALIES: &str = "/topic/anomalies";
    /// Latest per-service health snapshots.
    pub const SERVICE_HEALTH: &str = "/topic/service-health";
}
