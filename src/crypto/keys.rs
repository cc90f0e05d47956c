//! Erasable secret key material.
//!
//! Zeroizing on erase and on drop is a best-effort mitigation: it bounds how
//! long key bytes stay in memory we control, but cannot reach copies made by
//! the allocator, swap, or the hardware.

use std::fmt;

use rand::{RngCore, rngs::OsRng};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of every secret and derived key (32 bytes).
pub const SECRET_KEY_SIZE: usize = 32;

/// A 32-byte secret that is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; SECRET_KEY_SIZE],
}

impl SecretKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; SECRET_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut key = [0u8; SECRET_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.key
    }

    /// Overwrite the key bytes with zeros.
    pub fn erase(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_distinct() {
        let k1 = SecretKey::generate();
        let k2 = SecretKey::generate();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_erase_zeroes_bytes() {
        let mut key = SecretKey::from_bytes([0x42; SECRET_KEY_SIZE]);
        key.erase();
        assert_eq!(key.as_bytes(), &[0u8; SECRET_KEY_SIZE]);
    }

    #[test]
    fn test_debug_redacts() {
        let key = SecretKey::from_bytes([0xAB; SECRET_KEY_SIZE]);
        assert_eq!(format!("{key:?}"), "SecretKey([REDACTED])");
    }
}
