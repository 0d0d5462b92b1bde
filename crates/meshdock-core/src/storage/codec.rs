//! Reversible text-safe codec for stored values.
//!
//! Profiles and the current-profile pointer are stored as byte-pair hex:
//! each byte of the UTF-8 encoding becomes two lowercase hex digits.
//! Decoding accepts either case.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("decoded value is not valid UTF-8")]
    Utf8,
}

/// Encode a string as lowercase byte-pair hex.
pub fn encode(value: &str) -> String {
    hex::encode(value.as_bytes())
}

/// Decode a byte-pair hex string produced by [`encode`] (or by the stack).
pub fn decode(encoded: &str) -> Result<String, CodecError> {
    let bytes = hex::decode(encoded.trim())?;
    String::from_utf8(bytes).map_err(|_| CodecError::Utf8)
}
