//! Frame types for the Vantage session protocol.
//!
//! Inbound commands follow the STOMP-ish `{type, destination}` shape the
//! dashboard clients speak; outbound frames are event envelopes with the
//! serialized record as the body.

use serde::{Deserialize, Serialize};

/// Wire name of the connection acknowledgement frame.
pub const CONNECTION_SUCCESS: &str = "CONNECTION_SUCCESS";

/// An inbound session command.
///
/// Unknown `type` values decode to [`Command::Unknown`], a forward-compatible
/// no-op: the session stays connected and the command is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Subscribe to a topic; triggers history replay.
    #[serde(rename = "SUBSCRIBE")]
    Subscribe { destination: String },

    /// Unsubscribe from a topic.
    #[serde(rename = "UNSUBSCRIBE")]
    Unsubscribe { destination: String },

    /// Any command type this build does not know about.
    #[serde(other)]
    Unknown,
}

/// An outbound session frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Unsolicited acknowledgement, sent once on connect before any
    /// subscription exists.
    ConnectionSuccess {
        #[serde(rename = "type")]
        kind: &'static str,
        message: String,
    },

    /// A replayed or live event on a subscribed topic.
    Event {
        /// Topic the event belongs to.
        destination: String,
        /// JSON-serialized record.
        body: String,
    },
}

impl ServerFrame {
    /// Create the connection acknowledgement frame.
    #[must_use]
    pub fn connection_success(message: impl Into<String>) -> Self {
        ServerFrame::ConnectionSuccess {
            kind: CONNECTION_SUCCESS,
            message: message.into(),
        }
    }

    /// Create an event envelope.
    #[must_use]
    pub fn event(destination: impl Into<String>, body: impl Into<String>) -> Self {
        ServerFrame::Event {
            destination: destination.into(),
            body: body.into(),
        }
    }
}
