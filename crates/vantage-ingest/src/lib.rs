//! # vantage-ingest
//!
//! Upstream ingestion for the Vantage gateway.
//!
//! An [`UpstreamSource`] yields one raw message stream per upstream topic;
//! the [`IngestionAdapter`] owns one task per topic that decodes messages
//! into typed events and hands them to the hub, reconnecting forever on
//! upstream failure. [`SyntheticSource`] replaces a real log during
//! development and demos.

pub mod adapter;
pub mod source;
pub mod synthetic;

pub use adapter::{decode_event, IngestConfig, IngestionAdapter};
pub use source::{IngestError, TopicStream, UpstreamSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Upstream topic names, fixed by contract with the producers.
pub mod upstream_topic {
    /// MetricSample payloads.
    pub const METRICS_DATA: &str = "metrics-data";
    /// AnomalyEvent payloads.
    pub const ALERTS: &str = "alerts";
    /// HealthRecord payloads.
    pub const SERVICE_HEALTH: &str = "service-health";

    /// All upstream topics the adapter subscribes to.
    pub const ALL: [&str; 3] = [METRICS_DATA, ALERTS, SERVICE_HEALTH];
}
