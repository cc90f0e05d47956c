//! Frame codec and tag recognition.
//!
//! One stream carries one direction of one connection:
//!
//! ```text
//! [ tag (16, initiator only) ][ frame 0 ][ frame 1 ] ... [ last frame ]
//!                              \___ frame_length ___/     \_ <= frame_length, ends at EOF
//! ```
//!
//! - [`FrameWriter`] seals and writes frames, charging each against the
//!   stream's capacity
//! - [`FrameReader`] reads the tag (via a [`TagRecognizer`](crate::core::TagRecognizer))
//!   and decrypts frames with [`FrameDecoder`]
//! - [`TagIndex`] keeps the tags of every live secret in a hash index
//!
//! Any failure that leaves the stream in an unknown state erases its key.

mod error;
mod frame;
mod reader;
mod recognizer;
mod writer;

pub use error::*;
pub use frame::*;
pub use reader::{FrameDecoder, FrameReader};
pub use recognizer::TagIndex;
pub use writer::{FrameWriter, MIN_FRAME_LENGTH};
