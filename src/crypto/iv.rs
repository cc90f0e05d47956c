//! IV and AAD construction for frame sealing.
//!
//! IV layout (12 bytes):
//! ```text
//! [ frame_number (8, BE) | domain (1) | zeros (3) ]
//! ```
//! The domain byte separates the header seal from the body seal of the same
//! frame, so with one key per stream no (key, IV) pair ever repeats.
//!
//! AAD layout (12 bytes):
//! ```text
//! [ frame_number (8, BE) | plaintext_length (4, BE) ]
//! ```

use crate::core::{AAD_LENGTH, IV_LENGTH};

/// Which part of a frame an IV seals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SealDomain {
    /// The 4-byte frame header (0x01).
    Header,
    /// Payload and padding (0x02).
    Body,
}

impl SealDomain {
    /// Get the byte representation.
    pub fn as_byte(self) -> u8 {
        match self {
            SealDomain::Header => 0x01,
            SealDomain::Body => 0x02,
        }
    }
}

/// Construct the IV for one seal of frame `frame_number`.
pub fn encode_iv(frame_number: u64, domain: SealDomain) -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    iv[0..8].copy_from_slice(&frame_number.to_be_bytes());
    iv[8] = domain.as_byte();
    iv
}

/// Construct the AAD binding a seal to its frame number and length.
pub fn encode_aad(frame_number: u64, plaintext_length: usize) -> [u8; AAD_LENGTH] {
    let mut aad = [0u8; AAD_LENGTH];
    aad[0..8].copy_from_slice(&frame_number.to_be_bytes());
    aad[8..12].copy_from_slice(&(plaintext_length as u32).to_be_bytes());
    aad
}
