//! Encoding and decoding of session frames.
//!
//! Frames travel as JSON text; there is no length-prefixed binary framing
//! because WebSocket text messages already delimit each frame.

use thiserror::Error;

use crate::frames::{Command, ServerFrame};

/// Maximum accepted inbound command size (64 KiB).
pub const MAX_COMMAND_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Command exceeds maximum size.
    #[error("Command size {0} exceeds maximum {MAX_COMMAND_SIZE}")]
    CommandTooLarge(usize),

    /// Malformed inbound command.
    #[error("Malformed command: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Outbound frame serialization failure.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decode an inbound command from a text frame.
///
/// # Errors
///
/// Returns an error if the text is oversized or not a valid command. The
/// caller logs and ignores these; a malformed command never disconnects the
/// session.
pub fn decode_command(text: &str) -> Result<Command, ProtocolError> {
    if text.len() > MAX_COMMAND_SIZE {
        return Err(ProtocolError::CommandTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(ProtocolError::Malformed)
}

/// Encode an outbound frame to a text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_frame(frame: &ServerFrame) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(ProtocolError::Encode)
}
