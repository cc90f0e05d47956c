//! Cryptographic primitives for the secure transport layer.
//!
//! - `keys`: erasable 32-byte secrets
//! - `kdf`: the temporary secret chain and per-stream key derivation
//! - `aead`: ChaCha20-Poly1305 with detached MACs
//! - `iv`: per-frame IV and AAD construction
//! - `tag`: stream tags
//! - `window`: reordering window for stream and frame numbers

mod aead;
mod iv;
mod kdf;
mod keys;
mod tag;
mod window;

pub use aead::{open_in_place, seal_in_place};
pub use iv::{SealDomain, encode_aad, encode_iv};
pub use kdf::{derive_frame_key, derive_next_secret, derive_secret_at, derive_tag_key};
pub use keys::{SECRET_KEY_SIZE, SecretKey};
pub use tag::encode_tag;
pub use window::ReorderingWindow;
