//! # vantage-protocol
//!
//! Wire protocol for Vantage subscriber sessions.
//!
//! Sessions speak JSON text frames over a persistent bidirectional
//! connection. Inbound frames are commands carrying a `type` and a
//! `destination` topic; outbound frames are either the one-off connection
//! acknowledgement or `{destination, body}` event envelopes.

pub mod codec;
pub mod frames;

pub use codec::{decode_command, encode_frame, ProtocolError};
pub use frames::{Command, ServerFrame};
