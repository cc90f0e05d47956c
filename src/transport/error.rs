//! Transport layer error types.
//!
//! Errors fall into three classes:
//!
//! - silent drops: the peer sent something we cannot authenticate; the
//!   connection is abandoned without telling the peer why
//! - fatal: the stream cannot continue (I/O failure, truncation, erased keys)
//! - programmer errors: the caller misused the codec; nothing was written

use std::io;

use thiserror::Error;

use super::frame::FrameError;
use crate::core::{CryptoError, RecognitionError, StoreError};

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Decrypted header or body is malformed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Underlying reader or writer failed. Keys have been erased.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// MAC verification failed for a header or body.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The stream's tag does not match any live secret.
    #[error("unrecognized tag")]
    UnrecognizedTag,

    /// The stream ended before a frame carrying the last-frame flag.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Frame would be larger than the frame length, or a non-final frame
    /// would be shorter than it.
    #[error("frame of {actual} bytes does not fit frame length {frame_length}")]
    FrameSize {
        /// Ciphertext length the frame would have.
        actual: usize,
        /// Fixed frame length of the stream.
        frame_length: usize,
    },

    /// Frame would exceed the stream's remaining capacity.
    #[error("frame of {required} bytes exceeds remaining capacity {remaining}")]
    CapacityExceeded {
        /// Bytes the frame would consume.
        required: u64,
        /// Bytes left on the stream.
        remaining: u64,
    },

    /// Requested frame length cannot hold a header and MAC, or is above
    /// `MAX_FRAME_LENGTH`.
    #[error("invalid frame length {0}")]
    InvalidFrameLength(usize),

    /// Key material was erased after an earlier failure.
    #[error("stream keys have been erased")]
    KeysErased,

    /// Key derivation or sealing failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Tag recognition could not persist its window.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl TransportError {
    /// Check if this error should result in silently abandoning the stream.
    ///
    /// Nothing about the failure is reported back to the peer, so a prober
    /// learns nothing about which secrets we hold.
    pub fn is_silent_drop(&self) -> bool {
        matches!(
            self,
            TransportError::AuthenticationFailed
                | TransportError::UnrecognizedTag
                | TransportError::Frame(_)
                | TransportError::Crypto(CryptoError::DecryptionFailed)
                | TransportError::Crypto(CryptoError::ReplayDetected)
        )
    }

    /// Check if this error ends the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Io(_)
                | TransportError::UnexpectedEof
                | TransportError::KeysErased
                | TransportError::Store(_)
        ) || self.is_silent_drop()
    }

    /// Check if this error was caused by misuse of the codec.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            TransportError::FrameSize { .. }
                | TransportError::CapacityExceeded { .. }
                | TransportError::InvalidFrameLength(_)
        )
    }
}

impl From<RecognitionError> for TransportError {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::Store(e) => TransportError::Store(e),
            RecognitionError::Crypto(e) => TransportError::Crypto(e),
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
