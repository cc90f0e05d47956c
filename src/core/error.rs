//! Error types shared across the secure transport layer.

use thiserror::Error;

use super::types::{ContactId, TransportId};

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// A stream or frame number was already seen, or fell outside the
    /// reordering window.
    #[error("number already seen or outside the reordering window")]
    ReplayDetected,
}

/// Errors reported by a [`SecretStore`](super::SecretStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// I/O error in a file-backed store.
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`TagRecognizer`](super::TagRecognizer).
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The advanced reordering window could not be persisted.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Tags for the numbers entering the window could not be derived.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors in the key manager.
#[derive(Debug, Error)]
pub enum KeyManagerError {
    /// Persistence failed; the operation was aborted without side effects.
    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),

    /// Key derivation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The wall clock is earlier than a secret's creation time.
    ///
    /// All window arithmetic assumes time moves forward, so this is never
    /// tolerated silently.
    #[error(
        "clock moved backwards for contact {contact_id} on transport {transport_id}: \
         now {now} ms is before creation {creation} ms of period {period}"
    )]
    ClockMovedBackwards {
        /// Contact owning the secret.
        contact_id: ContactId,
        /// Transport owning the secret.
        transport_id: TransportId,
        /// Period of the offending secret.
        period: u64,
        /// Wall-clock time observed.
        now: u64,
        /// Creation time the secret was scheduled for (may be negative).
        creation: i128,
    },

    /// `start` was called on a running manager.
    #[error("key manager already running")]
    AlreadyRunning,
}
