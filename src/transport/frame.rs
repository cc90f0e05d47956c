//! Frame header encoding and decoding.
//!
//! Plaintext header (4 bytes, sealed under its own MAC on the wire):
//! ```text
//! +---------+--------+------------------+
//! | Version | Flags  | Payload Length   |
//! | 1 byte  | 1 byte | 2 bytes (BE16)   |
//! +---------+--------+------------------+
//! ```
//!
//! The body that follows is `payload || zero padding`, sealed under a second
//! MAC. The padding length is implied by the ciphertext length.

use thiserror::Error;

use crate::core::{FLAG_LAST_FRAME, HEADER_PLAINTEXT_LENGTH, MAX_PAYLOAD_LENGTH, PROTOCOL_VERSION};

/// Decrypted frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version.
    pub version: u8,
    /// Whether this is the last frame of the stream.
    pub last_frame: bool,
    /// Number of payload bytes in the body; the rest is padding.
    pub payload_length: u16,
}

impl FrameHeader {
    /// Create a header for the current protocol version.
    pub fn new(payload_length: u16, last_frame: bool) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            last_frame,
            payload_length,
        }
    }

    /// Serialize to bytes (4 bytes).
    pub fn to_bytes(&self) -> [u8; HEADER_PLAINTEXT_LENGTH] {
        let mut buf = [0u8; HEADER_PLAINTEXT_LENGTH];
        buf[0] = self.version;
        buf[1] = if self.last_frame { FLAG_LAST_FRAME } else { 0 };
        buf[2..4].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Parse from decrypted bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_PLAINTEXT_LENGTH {
            return Err(FrameError::TooShort {
                expected: HEADER_PLAINTEXT_LENGTH,
                actual: bytes.len(),
            });
        }

        if bytes[0] != PROTOCOL_VERSION {
            return Err(FrameError::UnsupportedVersion(bytes[0]));
        }
        if bytes[1] & !FLAG_LAST_FRAME != 0 {
            return Err(FrameError::InvalidFlags(bytes[1]));
        }

        let payload_length = u16::from_be_bytes([bytes[2], bytes[3]]);
        if usize::from(payload_length) > MAX_PAYLOAD_LENGTH {
            return Err(FrameError::PayloadTooLong(usize::from(payload_length)));
        }

        Ok(Self {
            version: bytes[0],
            last_frame: bytes[1] & FLAG_LAST_FRAME != 0,
            payload_length,
        })
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position of the frame in the stream.
    pub frame_number: u64,
    /// Payload bytes, padding removed.
    pub payload: Vec<u8>,
    /// Whether this was the last frame.
    pub last_frame: bool,
}

/// Errors in decrypted frame contents.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Input is too short.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Unknown protocol version.
    #[error("unsupported protocol version: 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// Reserved flag bits are set.
    #[error("invalid flags: 0x{0:02x} (reserved bits must be 0)")]
    InvalidFlags(u8),

    /// Declared payload length exceeds `MAX_PAYLOAD_LENGTH`.
    #[error("payload length {0} exceeds maximum")]
    PayloadTooLong(usize),

    /// Declared payload length exceeds the body actually received.
    #[error("payload length mismatch: header says {expected}, but {actual} bytes available")]
    PayloadLengthMismatch {
        /// Payload length from the header.
        expected: usize,
        /// Body bytes available.
        actual: usize,
    },

    /// The last frame runs past the frame length.
    #[error("frame exceeds frame length {limit}")]
    TooLong {
        /// Fixed frame length of the stream.
        limit: usize,
    },

    /// Padding contains a non-zero byte.
    #[error("non-zero padding")]
    InvalidPadding,
}
