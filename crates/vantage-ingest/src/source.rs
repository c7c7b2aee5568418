//! Upstream source abstraction.
//!
//! Sources hide the underlying log (Kafka, a synthetic generator, a fixture
//! in tests) behind a per-topic stream of raw payloads, so the adapter is
//! source-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Ingestion errors.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Upstream is unreachable; the adapter retries indefinitely.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The message stream failed mid-flight; the adapter reconnects.
    #[error("Stream failed: {0}")]
    Stream(String),

    /// Releasing an upstream subscription failed; logged, never fatal.
    #[error("Release failed: {0}")]
    Release(String),

    /// No decoder for this upstream topic.
    #[error("Unknown upstream topic: {0}")]
    UnknownTopic(String),

    /// Payload did not match the topic's record shape; the message is dropped.
    #[error("Malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A source of raw upstream messages.
///
/// One logical subscription is established per upstream topic; the source
/// decides what that means (a consumer group member, a generator task, ...).
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Open a message stream for one upstream topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream is unreachable; the adapter retries.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn TopicStream>, IngestError>;

    /// Get the source name (e.g., "synthetic", "kafka").
    fn name(&self) -> &'static str;
}

/// An open per-topic message stream.
///
/// Messages are yielded in partition order; the adapter never reorders or
/// parallelizes within a topic.
#[async_trait]
pub trait TopicStream: Send {
    /// Receive the next raw payload.
    ///
    /// Returns `None` if the stream ended cleanly (the adapter reconnects).
    ///
    /// # Errors
    ///
    /// Returns an error if the stream failed; the adapter reconnects.
    async fn next(&mut self) -> Result<Option<Bytes>, IngestError>;

    /// Release the upstream subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the release failed; shutdown proceeds regardless.
    async fn release(&mut self) -> Result<(), IngestError>;
}
