//! Key derivation for the temporary secret chain and per-stream keys.
//!
//! ```text
//! secret(0)   = BLAKE2s(LABEL_NEXT_SECRET || BE64(0) || initial_secret)
//! secret(p)   = BLAKE2s(LABEL_NEXT_SECRET || BE64(p) || secret(p - 1))
//!
//! tag_key     = HKDF-Expand(secret, LABEL_TAG_{ALICE,BOB}, 32)
//! frame_key   = HKDF-Expand(secret, LABEL_FRAME_{ALICE,BOB} || BE64(stream), 32)
//! ```
//!
//! The chain is one-way: holding secret(p) reveals nothing about earlier
//! periods, which is what gives rotation its forward secrecy.

use blake2::{Blake2s256, Digest};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use super::keys::{SECRET_KEY_SIZE, SecretKey};
use crate::core::{
    CryptoError, LABEL_FRAME_ALICE, LABEL_FRAME_BOB, LABEL_NEXT_SECRET, LABEL_TAG_ALICE,
    LABEL_TAG_BOB,
};

/// Derive the secret for `period` from the secret of the previous period.
pub fn derive_next_secret(secret: &SecretKey, period: u64) -> SecretKey {
    let mut hasher = Blake2s256::new();
    hasher.update(LABEL_NEXT_SECRET);
    hasher.update(period.to_be_bytes());
    hasher.update(secret.as_bytes());
    let mut digest = hasher.finalize();

    let mut next = [0u8; SECRET_KEY_SIZE];
    next.copy_from_slice(&digest);
    digest.as_mut_slice().zeroize();

    SecretKey::from_bytes(next)
}

/// Walk the chain forward from `secret` (of period `from`) to period `to`.
///
/// Returns a copy of `secret` when `to <= from`.
pub fn derive_secret_at(secret: &SecretKey, from: u64, to: u64) -> SecretKey {
    let mut current = secret.clone();
    for period in from.saturating_add(1)..=to {
        current = derive_next_secret(&current, period);
    }
    current
}

/// Derive the key that computes tags for streams written by one side.
///
/// `alice` is the writer's role on the endpoint, not necessarily ours.
pub fn derive_tag_key(secret: &SecretKey, alice: bool) -> Result<SecretKey, CryptoError> {
    let label = if alice { LABEL_TAG_ALICE } else { LABEL_TAG_BOB };
    expand(secret, &[label])
}

/// Derive the AEAD key for one stream written by one side.
pub fn derive_frame_key(
    secret: &SecretKey,
    stream_number: u64,
    alice: bool,
) -> Result<SecretKey, CryptoError> {
    let label = if alice { LABEL_FRAME_ALICE } else { LABEL_FRAME_BOB };
    expand(secret, &[label, &stream_number.to_be_bytes()])
}

fn expand(secret: &SecretKey, info: &[&[u8]]) -> Result<SecretKey, CryptoError> {
    // The temporary secret is already uniformly random, so it is used as the
    // PRK directly (HKDF-Expand only).
    let hk = Hkdf::<Sha256>::from_prk(secret.as_bytes())
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    let mut okm = [0u8; SECRET_KEY_SIZE];
    hk.expand_multi_info(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(SecretKey::from_bytes(okm))
}
