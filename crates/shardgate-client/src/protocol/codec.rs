//! Envelope codec
//!
//! Converts between raw text/binary frames and [`Envelope`]s. Pure functions,
//! no connection state.

use super::Envelope;
use crate::error::CodecError;

/// Decode a text frame
pub fn decode(frame: &str) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_str(frame)?)
}

/// Decode a binary frame holding UTF-8 JSON
pub fn decode_binary(frame: &[u8]) -> Result<Envelope, CodecError> {
    let text = std::str::from_utf8(frame).map_err(|_| CodecError::InvalidUtf8)?;
    decode(text)
}

/// Encode an envelope as a text frame
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(CodecError::Encode)
}
