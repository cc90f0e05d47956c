//! Stream tags.
//!
//! `tag = HKDF-Expand(tag_key, LABEL_TAG || BE64(stream_number), 16)`.
//! Only holders of the secret can compute or recognize a tag, and tags of
//! different streams are unlinkable to anyone else.

use hkdf::Hkdf;
use sha2::Sha256;

use super::keys::SecretKey;
use crate::core::{CryptoError, LABEL_TAG, TAG_LENGTH};

/// Compute the tag that opens stream `stream_number`.
pub fn encode_tag(tag_key: &SecretKey, stream_number: u64) -> Result<[u8; TAG_LENGTH], CryptoError> {
    let hk = Hkdf::<Sha256>::from_prk(tag_key.as_bytes())
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    let mut tag = [0u8; TAG_LENGTH];
    hk.expand_multi_info(&[LABEL_TAG, &stream_number.to_be_bytes()], &mut tag)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(tag)
}
