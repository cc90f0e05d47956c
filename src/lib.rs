//! # tagstream
//!
//! Secure transport layer for peer-to-peer byte streams over untrusted
//! transports.
//!
//! - **Tagged frames**: each stream opens with a pseudo-random tag and carries
//!   fixed-size frames sealed with ChaCha20-Poly1305
//! - **Time-windowed keys**: per-endpoint secrets rotate on a schedule derived
//!   from the transport's latency, with old/current/new phases live at once
//! - **Forward secrecy**: the secret chain is one-way and dead secrets are
//!   purged
//!
//! ## Feature Flags
//!
//! - `transport` (default): frame writer and reader, tag index
//! - `keys` (default): key manager
//! - `runtime` (default): tokio-backed [`Timer`](core::Timer)
//!
//! ## Modules
//!
//! - [`core`]: constants, value types, errors and collaborator traits
//! - [`crypto`]: key derivation, AEAD, tags, reordering window
//! - [`store`]: in-memory [`SecretStore`](core::SecretStore)
//! - [`system`]: clocks, timers and an event bus
//! - [`transport`]: frame codec and tag recognition (requires `transport`)
//! - [`keys`]: rotation and stream contexts (requires `keys`)
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use tagstream::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! store.add_transport(TransportId::new("tcp"), 30_000);
//! let index = Arc::new(TagIndex::new(store.clone()));
//! let clock = Arc::new(ManualClock::new(1_000_000_001));
//! let timer = Arc::new(ManualTimer::new(clock.clone()));
//!
//! let manager = KeyManager::new(
//!     KeyManagerConfig::default(),
//!     store.clone(),
//!     index.clone(),
//!     Arc::new(LocalEventBus::new()),
//!     clock,
//!     timer,
//! );
//! manager.start()?;
//!
//! let endpoint = Endpoint::new(ContactId(1), TransportId::new("tcp"), 1_000_000_000, true);
//! manager.endpoint_added(endpoint, 30_000, &SecretKey::generate())?;
//!
//! let ctx = manager
//!     .get_stream_context(ContactId(1), &TransportId::new("tcp"))?
//!     .ok_or("no current secret")?;
//! let mut writer = FrameWriter::initiator(Vec::new(), &ctx, MIN_STREAM_LENGTH, MAX_FRAME_LENGTH)?;
//! writer.write_frame(b"hello", 0, true)?;
//! assert!(!writer.into_inner().is_empty());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod crypto;
pub mod store;
pub mod system;

// Frame codec (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Key manager (feature-gated)
#[cfg(feature = "keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "keys")))]
pub mod keys;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::crypto::{SECRET_KEY_SIZE, SecretKey};
    pub use crate::store::MemoryStore;
    pub use crate::system::{LocalEventBus, ManualClock, ManualTimer, SystemClock};

    #[cfg(feature = "runtime")]
    pub use crate::system::TokioTimer;

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        Frame, FrameDecoder, FrameReader, FrameWriter, MIN_FRAME_LENGTH, TagIndex,
        TransportError, TransportResult,
    };

    #[cfg(feature = "keys")]
    pub use crate::keys::{KeyManager, KeyManagerConfig, RotationSummary};
}

// Re-export commonly used items at crate root
pub use crate::core::{ContactId, Endpoint, StreamContext, TransportId};

#[cfg(feature = "keys")]
pub use keys::KeyManager;

#[cfg(feature = "transport")]
pub use transport::{FrameReader, FrameWriter, TagIndex};
