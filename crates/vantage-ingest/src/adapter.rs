//! The ingestion adapter.
//!
//! One task per upstream topic: connect, decode, publish, reconnect. No
//! failure on this path is fatal to the process; connectivity errors retry
//! on a fixed delay forever and bad messages are dropped one at a time.

use crate::source::{IngestError, TopicStream, UpstreamSource};
use crate::upstream_topic;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vantage_core::event::{AnomalyEvent, HealthRecord, MetricSample};
use vantage_core::{Event, Hub};

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Fixed delay between reconnect attempts.
    pub retry_delay: Duration,
    /// Bound on releasing an upstream subscription at shutdown.
    pub release_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            release_timeout: Duration::from_secs(2),
        }
    }
}

/// Decode a raw upstream payload into the typed event for its topic.
///
/// Unknown extra fields are ignored; missing required fields fail the
/// decode and the message is dropped by the caller.
///
/// # Errors
///
/// Returns an error for unknown topics or payloads that do not match the
/// topic's record shape.
pub fn decode_event(topic: &str, payload: &[u8]) -> Result<Event, IngestError> {
    match topic {
        upstream_topic::METRICS_DATA => serde_json::from_slice::<MetricSample>(payload)
            .map(Event::from)
            .map_err(IngestError::Malformed),
        upstream_topic::ALERTS => serde_json::from_slice::<AnomalyEvent>(payload)
            .map(Event::from)
            .map_err(IngestError::Malformed),
        upstream_topic::SERVICE_HEALTH => serde_json::from_slice::<HealthRecord>(payload)
            .map(Event::from)
            .map_err(IngestError::Malformed),
        other => Err(IngestError::UnknownTopic(other.to_string())),
    }
}

/// Maintains one ingestion task per upstream topic.
pub struct IngestionAdapter {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    release_timeout: Duration,
}

impl IngestionAdapter {
    /// Spawn ingestion tasks for every upstream topic.
    #[must_use]
    pub fn spawn(source: Arc<dyn UpstreamSource>, hub: Arc<Hub>, config: IngestConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        info!(source = source.name(), "Starting ingestion adapter");

        let tasks = upstream_topic::ALL
            .into_iter()
            .map(|topic| {
                tokio::spawn(run_topic(
                    source.clone(),
                    hub.clone(),
                    topic,
                    config.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        Self {
            shutdown,
            tasks,
            release_timeout: config.release_timeout,
        }
    }

    /// Stop all ingestion tasks, releasing upstream subscriptions in
    /// bounded time. Release failures are logged; shutdown proceeds.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        // Tasks release their own subscriptions; bound the total wait.
        let deadline = self.release_timeout + Duration::from_secs(1);
        for task in self.tasks {
            if tokio::time::timeout(deadline, task).await.is_err() {
                warn!("Ingestion task did not stop in time");
            }
        }
        info!("Ingestion adapter stopped");
    }
}

async fn run_topic(
    source: Arc<dyn UpstreamSource>,
    hub: Arc<Hub>,
    topic: &'static str,
    config: IngestConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connected_before = false;

    'reconnect: loop {
        if *shutdown.borrow() {
            return;
        }

        let mut stream = match source.subscribe(topic).await {
            Ok(stream) => {
                info!(topic = %topic, source = source.name(), "Upstream subscription established");
                if connected_before {
                    counter!("vantage_upstream_reconnects_total", "topic" => topic).increment(1);
                }
                connected_before = true;
                stream
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Upstream connect failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(config.retry_delay) => continue 'reconnect,
                    _ = shutdown.changed() => return,
                }
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    release_stream(&mut *stream, topic, config.release_timeout).await;
                    return;
                }
                message = stream.next() => match message {
                    Ok(Some(payload)) => match decode_event(topic, &payload) {
                        Ok(event) => {
                            // Store update happens inside publish, before
                            // any session delivery.
                            hub.publish(event);
                            counter!("vantage_events_ingested_total", "topic" => topic).increment(1);
                        }
                        Err(e) => {
                            warn!(topic = %topic, error = %e, "Dropping undecodable message");
                            counter!("vantage_decode_failures_total", "topic" => topic).increment(1);
                        }
                    },
                    Ok(None) => {
                        debug!(topic = %topic, "Upstream stream ended, reconnecting");
                        break;
                    }
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Upstream stream failed, reconnecting");
                        break;
                    }
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.retry_delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

async fn release_stream(stream: &mut dyn TopicStream, topic: &str, timeout: Duration) {
    match tokio::time::timeout(timeout, stream.release()).await {
        Ok(Ok(())) => debug!(topic = %topic, "Upstream subscription released"),
        Ok(Err(e)) => warn!(topic = %topic, error = %e, "Upstream release failed"),
        Err(_) => warn!(topic = %topic, "Upstream release timed out"),
    }
}
