//! Protocol constants for the secure transport layer.
//!
//! Wire-level values are fixed for interoperability and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Length of the pseudo-random tag that opens an initiator's stream.
pub const TAG_LENGTH: usize = 16;

/// Maximum length of a frame, including the header and MAC.
pub const MAX_FRAME_LENGTH: usize = 1024;

/// Poly1305 authentication tag size.
pub const MAC_LENGTH: usize = 16;

/// Plaintext length of the frame header (version + flags + payload length).
pub const HEADER_PLAINTEXT_LENGTH: usize = 4;

/// Length of the sealed frame header on the wire.
pub const HEADER_LENGTH: usize = HEADER_PLAINTEXT_LENGTH + MAC_LENGTH;

/// Maximum combined length of payload and padding in one frame.
pub const MAX_PAYLOAD_LENGTH: usize = MAX_FRAME_LENGTH - HEADER_LENGTH - MAC_LENGTH;

/// ChaCha20-Poly1305 IV size.
pub const IV_LENGTH: usize = 12;

/// AAD size (frame number + plaintext length).
pub const AAD_LENGTH: usize = 8 + 4;

/// Minimum stream length every transport must support.
pub const MIN_STREAM_LENGTH: u64 = 64 * 1024;

/// Current frame protocol version.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Header flag marking the final frame of a stream.
pub const FLAG_LAST_FRAME: u8 = 0x01;

// =============================================================================
// KEY ROTATION
// =============================================================================

/// Maximum tolerated difference between two peers' clocks.
pub const MAX_CLOCK_DIFFERENCE: Duration = Duration::from_secs(60 * 60);

/// Default interval between rotation checks.
pub const ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Number of stream or frame numbers tracked ahead of the lowest unseen one.
pub const REORDERING_WINDOW_SIZE: usize = 32;

// =============================================================================
// KEY DERIVATION LABELS
// =============================================================================

/// Label for advancing the temporary secret chain.
pub const LABEL_NEXT_SECRET: &[u8] = b"tagstream v1 next secret";

/// Tag key label for streams written by the initiator.
pub const LABEL_TAG_ALICE: &[u8] = b"tagstream v1 tag alice";

/// Tag key label for streams written by the responder.
pub const LABEL_TAG_BOB: &[u8] = b"tagstream v1 tag bob";

/// Frame key label for streams written by the initiator.
pub const LABEL_FRAME_ALICE: &[u8] = b"tagstream v1 frame alice";

/// Frame key label for streams written by the responder.
pub const LABEL_FRAME_BOB: &[u8] = b"tagstream v1 frame bob";

/// Label for expanding a tag key into a tag.
pub const LABEL_TAG: &[u8] = b"tagstream v1 tag";
