//! Outgoing half of the frame codec.
//!
//! A stream opened by the initiator starts with the 16-byte tag that lets
//! the peer find the secret; the responder's half of a connection has no
//! tag. Every frame is sealed under the stream's frame key with an IV
//! derived from its frame number, so no (key, IV) pair repeats.
//!
//! Frames other than the last are exactly `frame_length` bytes on the wire.

use std::io::Write;

use tracing::{debug, warn};
use zeroize::Zeroize;

use super::error::{TransportError, TransportResult};
use super::frame::FrameHeader;
use crate::core::{
    HEADER_LENGTH, HEADER_PLAINTEXT_LENGTH, MAC_LENGTH, MAX_FRAME_LENGTH, StreamContext, TAG_LENGTH,
};
use crate::crypto::{
    SealDomain, SecretKey, derive_frame_key, derive_tag_key, encode_aad, encode_iv, encode_tag,
    seal_in_place,
};

/// Smallest usable frame length: a header and an empty body.
pub const MIN_FRAME_LENGTH: usize = HEADER_LENGTH + MAC_LENGTH;

/// Check that a frame length is usable.
pub(crate) fn validate_frame_length(frame_length: usize) -> TransportResult<()> {
    if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&frame_length) {
        return Err(TransportError::InvalidFrameLength(frame_length));
    }
    Ok(())
}

/// Encrypts and writes the frames of one outgoing stream.
pub struct FrameWriter<W: Write> {
    out: W,
    frame_key: SecretKey,
    tag: Option<[u8; TAG_LENGTH]>,
    frame_length: usize,
    frame_number: u64,
    capacity: u64,
    erased: bool,
}

impl<W: Write> FrameWriter<W> {
    /// Create the writer for a stream we open: the tag precedes the first
    /// frame and is charged against `capacity` up front.
    pub fn initiator(
        out: W,
        ctx: &StreamContext,
        capacity: u64,
        frame_length: usize,
    ) -> TransportResult<Self> {
        validate_frame_length(frame_length)?;
        let remaining = capacity.checked_sub(TAG_LENGTH as u64).ok_or(
            TransportError::CapacityExceeded {
                required: TAG_LENGTH as u64,
                remaining: capacity,
            },
        )?;

        let tag_key = derive_tag_key(&ctx.secret, ctx.alice)?;
        let tag = encode_tag(&tag_key, ctx.stream_number)?;
        let frame_key = derive_frame_key(&ctx.secret, ctx.stream_number, ctx.alice)?;

        debug!(
            contact = %ctx.contact_id,
            transport = %ctx.transport_id,
            stream = ctx.stream_number,
            "opening tagged outgoing stream"
        );

        Ok(Self {
            out,
            frame_key,
            tag: Some(tag),
            frame_length,
            frame_number: 0,
            capacity: remaining,
            erased: false,
        })
    }

    /// Create the writer for our reply on a stream the peer opened.
    pub fn responder(
        out: W,
        ctx: &StreamContext,
        capacity: u64,
        frame_length: usize,
    ) -> TransportResult<Self> {
        validate_frame_length(frame_length)?;
        let frame_key = derive_frame_key(&ctx.secret, ctx.stream_number, ctx.alice)?;

        Ok(Self {
            out,
            frame_key,
            tag: None,
            frame_length,
            frame_number: 0,
            capacity,
            erased: false,
        })
    }

    /// Encrypt and write one frame.
    ///
    /// `padding` zero bytes follow the payload inside the encrypted body.
    /// Size and capacity violations are rejected before anything is written.
    /// An I/O failure erases the keys; the writer is unusable afterwards.
    pub fn write_frame(
        &mut self,
        payload: &[u8],
        padding: usize,
        last_frame: bool,
    ) -> TransportResult<()> {
        if self.erased {
            return Err(TransportError::KeysErased);
        }

        let body_length = payload.len() + padding;
        let ciphertext_length = HEADER_LENGTH + body_length + MAC_LENGTH;
        if ciphertext_length > self.frame_length
            || (!last_frame && ciphertext_length < self.frame_length)
        {
            return Err(TransportError::FrameSize {
                actual: ciphertext_length,
                frame_length: self.frame_length,
            });
        }

        // An empty stream that never wrote its tag leaves no trace at all.
        if self.tag.is_some() && last_frame && body_length == 0 {
            return Ok(());
        }

        if ciphertext_length as u64 > self.capacity {
            return Err(TransportError::CapacityExceeded {
                required: ciphertext_length as u64,
                remaining: self.capacity,
            });
        }

        let mut frame = vec![0u8; ciphertext_length];
        self.seal_frame(&mut frame, payload, body_length, last_frame)?;

        if let Err(e) = self.write_all(&frame) {
            frame.zeroize();
            return Err(e);
        }
        frame.zeroize();

        self.frame_number += 1;
        self.capacity -= ciphertext_length as u64;
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> TransportResult<()> {
        if self.erased {
            return Err(TransportError::KeysErased);
        }
        if let Err(e) = self.out.flush() {
            self.erase();
            return Err(e.into());
        }
        Ok(())
    }

    /// Bytes that can still be written to the stream.
    pub fn remaining_capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of frames written so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Frame length of this stream.
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Check if the keys were erased.
    pub fn is_erased(&self) -> bool {
        self.erased
    }

    /// Erase the frame key and any unsent tag.
    pub fn erase(&mut self) {
        self.frame_key.erase();
        if let Some(tag) = self.tag.as_mut() {
            tag.zeroize();
        }
        self.tag = None;
        self.erased = true;
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn seal_frame(
        &self,
        frame: &mut [u8],
        payload: &[u8],
        body_length: usize,
        last_frame: bool,
    ) -> TransportResult<()> {
        let n = self.frame_number;

        // Bounded by MAX_PAYLOAD_LENGTH through the frame length check.
        let header = FrameHeader::new(payload.len() as u16, last_frame);
        let (header_part, body_part) = frame.split_at_mut(HEADER_LENGTH);

        header_part[..HEADER_PLAINTEXT_LENGTH].copy_from_slice(&header.to_bytes());
        let mac = seal_in_place(
            &self.frame_key,
            &encode_iv(n, SealDomain::Header),
            &encode_aad(n, HEADER_PLAINTEXT_LENGTH),
            &mut header_part[..HEADER_PLAINTEXT_LENGTH],
        )?;
        header_part[HEADER_PLAINTEXT_LENGTH..].copy_from_slice(&mac);

        let (body, body_mac) = body_part.split_at_mut(body_length);
        body[..payload.len()].copy_from_slice(payload);
        let mac = seal_in_place(
            &self.frame_key,
            &encode_iv(n, SealDomain::Body),
            &encode_aad(n, body_length),
            body,
        )?;
        body_mac.copy_from_slice(&mac);
        Ok(())
    }

    fn write_all(&mut self, frame: &[u8]) -> TransportResult<()> {
        let result = match self.tag.take() {
            Some(mut tag) => {
                let result = self
                    .out
                    .write_all(&tag)
                    .and_then(|()| self.out.write_all(frame));
                tag.zeroize();
                result
            }
            None => self.out.write_all(frame),
        };

        if let Err(e) = result {
            warn!(frame = self.frame_number, error = %e, "write failed, erasing stream keys");
            self.erase();
            return Err(e.into());
        }
        Ok(())
    }
}
