//! Error types for Marionette core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Validation and decoding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Servo fraction outside 0.0..=1.0 (or NaN)
    #[error("fraction out of range: {0} (expected 0.0..=1.0)")]
    FractionOutOfRange(f64),

    /// Servo angle outside 0..=180 degrees
    #[error("angle out of range: {0} (expected 0..=180)")]
    AngleOutOfRange(i32),

    /// Raw PWM duty outside what the output accepts
    #[error("duty out of range: {duty} (max {max})")]
    DutyOutOfRange { duty: u32, max: u32 },

    /// Strip pixel index past the end of the strip
    #[error("index {index} out of range for strip of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Full strip write with the wrong number of pixels
    #[error("length mismatch: expected {expected} colors, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Payload did not have the expected shape
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Buffer too small to decode a frame
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Unknown servo protocol command byte
    #[error("unknown command: 0x{0:02x}")]
    UnknownCommand(u8),

    /// Stream header announces a format nobody can play
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Stream header is internally inconsistent
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidPayload(e.to_string())
    }
}
