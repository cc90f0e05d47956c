//! ChaCha20-Poly1305 sealing of frame headers and bodies.
//!
//! Frames are fixed-size, so both operations work in place on a caller
//! buffer and keep the 16-byte MAC detached.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce, Tag,
    aead::{AeadInPlace, KeyInit},
};

use super::keys::SecretKey;
use crate::core::{CryptoError, IV_LENGTH, MAC_LENGTH};

/// Encrypt `buffer` in place and return its MAC.
pub fn seal_in_place(
    key: &SecretKey,
    iv: &[u8; IV_LENGTH],
    aad: &[u8],
    buffer: &mut [u8],
) -> Result<[u8; MAC_LENGTH], CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut mac = [0u8; MAC_LENGTH];
    mac.copy_from_slice(&tag);
    Ok(mac)
}

/// Verify `mac` and decrypt `buffer` in place.
///
/// On failure the buffer contents are unspecified and MUST be discarded.
pub fn open_in_place(
    key: &SecretKey,
    iv: &[u8; IV_LENGTH],
    aad: &[u8],
    buffer: &mut [u8],
    mac: &[u8],
) -> Result<(), CryptoError> {
    if mac.len() != MAC_LENGTH {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer, Tag::from_slice(mac))
        .map_err(|_| CryptoError::DecryptionFailed)
}
