//! Incoming half of the frame codec.
//!
//! [`FrameDecoder`] verifies and decrypts individual frames;
//! [`FrameReader`] drives it over a byte stream, starting from the tag when
//! the peer opened the stream.

use std::io::{ErrorKind, Read};

use tracing::{debug, warn};
use zeroize::Zeroize;

use super::error::{TransportError, TransportResult};
use super::frame::{Frame, FrameError, FrameHeader};
use super::writer::validate_frame_length;
use crate::core::{
    ContactId, CryptoError, HEADER_LENGTH, HEADER_PLAINTEXT_LENGTH, MAC_LENGTH, StreamContext,
    TAG_LENGTH, TagRecognizer, TransportId,
};
use crate::crypto::{
    ReorderingWindow, SealDomain, SecretKey, derive_frame_key, encode_aad, encode_iv,
    open_in_place,
};

/// Verifies and decrypts the frames of one incoming stream.
///
/// Frame numbers are not sent on the wire. The decoder finds a header's
/// number by trial decryption over the unseen numbers of its reordering
/// window, which tolerates frames arriving out of order within the window.
pub struct FrameDecoder {
    frame_key: SecretKey,
    window: ReorderingWindow,
    erased: bool,
}

impl FrameDecoder {
    /// Create a decoder for frames the peer writes on `ctx`'s stream.
    ///
    /// `ctx.alice` is the local role; the peer wrote with the other one.
    pub fn new(ctx: &StreamContext) -> TransportResult<Self> {
        let frame_key = derive_frame_key(&ctx.secret, ctx.stream_number, !ctx.alice)?;
        Ok(Self {
            frame_key,
            window: ReorderingWindow::new(),
            erased: false,
        })
    }

    /// Authenticate and decrypt a sealed header.
    ///
    /// Returns the frame number the header was sealed under. The number is
    /// not marked seen until its body has been verified.
    pub fn decode_header(&self, sealed: &[u8]) -> TransportResult<(u64, FrameHeader)> {
        self.check_header(sealed)?;
        for frame_number in self.window.unseen() {
            if let Some(header) = self.open_header(frame_number, sealed)? {
                return Ok((frame_number, header));
            }
        }

        Err(TransportError::AuthenticationFailed)
    }

    /// Authenticate and decrypt a header that must carry `frame_number`.
    ///
    /// Fails if the number was already seen or the header was sealed under
    /// any other number.
    pub fn decode_header_at(
        &self,
        frame_number: u64,
        sealed: &[u8],
    ) -> TransportResult<FrameHeader> {
        self.check_header(sealed)?;
        if !self.window.contains(frame_number) || self.window.is_seen(frame_number) {
            return Err(TransportError::AuthenticationFailed);
        }
        self.open_header(frame_number, sealed)?
            .ok_or(TransportError::AuthenticationFailed)
    }

    fn check_header(&self, sealed: &[u8]) -> TransportResult<()> {
        if self.erased {
            return Err(TransportError::KeysErased);
        }
        if sealed.len() != HEADER_LENGTH {
            return Err(FrameError::TooShort {
                expected: HEADER_LENGTH,
                actual: sealed.len(),
            }
            .into());
        }
        Ok(())
    }

    fn open_header(
        &self,
        frame_number: u64,
        sealed: &[u8],
    ) -> TransportResult<Option<FrameHeader>> {
        let (ciphertext, mac) = sealed.split_at(HEADER_PLAINTEXT_LENGTH);
        let mut plaintext = [0u8; HEADER_PLAINTEXT_LENGTH];
        plaintext.copy_from_slice(ciphertext);
        let opened = open_in_place(
            &self.frame_key,
            &encode_iv(frame_number, SealDomain::Header),
            &encode_aad(frame_number, HEADER_PLAINTEXT_LENGTH),
            &mut plaintext,
            mac,
        );
        match opened {
            Ok(()) => Ok(Some(FrameHeader::from_bytes(&plaintext)?)),
            Err(_) => Ok(None),
        }
    }

    /// Authenticate and decrypt a sealed body, then mark the frame seen.
    pub fn decode_body(
        &mut self,
        frame_number: u64,
        header: &FrameHeader,
        sealed: &[u8],
    ) -> TransportResult<Frame> {
        if self.erased {
            return Err(TransportError::KeysErased);
        }
        if sealed.len() < MAC_LENGTH {
            return Err(FrameError::TooShort {
                expected: MAC_LENGTH,
                actual: sealed.len(),
            }
            .into());
        }

        let body_length = sealed.len() - MAC_LENGTH;
        let payload_length = usize::from(header.payload_length);
        if payload_length > body_length {
            return Err(FrameError::PayloadLengthMismatch {
                expected: payload_length,
                actual: body_length,
            }
            .into());
        }

        let (ciphertext, mac) = sealed.split_at(body_length);
        let mut body = ciphertext.to_vec();
        open_in_place(
            &self.frame_key,
            &encode_iv(frame_number, SealDomain::Body),
            &encode_aad(frame_number, body_length),
            &mut body,
            mac,
        )
        .map_err(|_| TransportError::AuthenticationFailed)?;

        if body[payload_length..].iter().any(|&b| b != 0) {
            body.zeroize();
            return Err(FrameError::InvalidPadding.into());
        }

        self.window
            .mark_seen(frame_number)
            .map_err(|_| TransportError::Crypto(CryptoError::ReplayDetected))?;

        body.truncate(payload_length);
        Ok(Frame {
            frame_number,
            payload: body,
            last_frame: header.last_frame,
        })
    }

    /// Decode a complete frame held in one buffer.
    pub fn decode_frame(&mut self, sealed: &[u8]) -> TransportResult<Frame> {
        if sealed.len() < HEADER_LENGTH {
            return Err(FrameError::TooShort {
                expected: HEADER_LENGTH + MAC_LENGTH,
                actual: sealed.len(),
            }
            .into());
        }
        let (header_part, body_part) = sealed.split_at(HEADER_LENGTH);
        let (frame_number, header) = self.decode_header(header_part)?;
        self.decode_body(frame_number, &header, body_part)
    }

    /// Erase the frame key.
    pub fn erase(&mut self) {
        self.frame_key.erase();
        self.erased = true;
    }

    /// Check if the key was erased.
    pub fn is_erased(&self) -> bool {
        self.erased
    }
}

/// Reads the frames of one incoming stream from a byte source.
///
/// A byte stream delivers frames in order, so the reader accepts only the
/// next frame number. A dropped, duplicated or swapped frame fails
/// authentication.
pub struct FrameReader<R: Read> {
    input: R,
    decoder: FrameDecoder,
    next_frame: u64,
    frame_length: usize,
    contact_id: ContactId,
    transport_id: TransportId,
    stream_number: u64,
    finished: bool,
}

impl<R: Read> FrameReader<R> {
    /// Create a reader for a stream whose context is already known (the
    /// peer's reply on a stream we opened).
    pub fn new(input: R, ctx: &StreamContext, frame_length: usize) -> TransportResult<Self> {
        validate_frame_length(frame_length)?;
        Ok(Self {
            input,
            decoder: FrameDecoder::new(ctx)?,
            next_frame: 0,
            frame_length,
            contact_id: ctx.contact_id,
            transport_id: ctx.transport_id.clone(),
            stream_number: ctx.stream_number,
            finished: false,
        })
    }

    /// Read the tag from a stream the peer opened and look up its secret.
    ///
    /// Unrecognized tags are rejected with
    /// [`TransportError::UnrecognizedTag`].
    pub fn accept(
        mut input: R,
        recognizer: &dyn TagRecognizer,
        frame_length: usize,
    ) -> TransportResult<Self> {
        validate_frame_length(frame_length)?;

        let mut tag = [0u8; TAG_LENGTH];
        read_exact_or_eof(&mut input, &mut tag)?;

        let ctx = recognizer
            .recognize(&tag)?
            .ok_or(TransportError::UnrecognizedTag)?;

        debug!(
            contact = %ctx.contact_id,
            transport = %ctx.transport_id,
            stream = ctx.stream_number,
            "recognized incoming stream"
        );
        Self::new(input, &ctx, frame_length)
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` once the last frame has been read. Any error erases
    /// the stream key; the reader is unusable afterwards.
    pub fn read_frame(&mut self) -> TransportResult<Option<Frame>> {
        if self.decoder.is_erased() {
            return Err(TransportError::KeysErased);
        }
        if self.finished {
            return Ok(None);
        }

        match self.read_next() {
            Ok(frame) => {
                self.next_frame += 1;
                self.finished = frame.last_frame;
                Ok(Some(frame))
            }
            Err(e) => {
                warn!(
                    contact = %self.contact_id,
                    transport = %self.transport_id,
                    stream = self.stream_number,
                    error = %e,
                    "incoming stream failed, erasing key"
                );
                self.decoder.erase();
                Err(e)
            }
        }
    }

    /// Contact that opened the stream.
    pub fn contact_id(&self) -> ContactId {
        self.contact_id
    }

    /// Transport the stream arrived on.
    pub fn transport_id(&self) -> &TransportId {
        &self.transport_id
    }

    /// Stream number within the secret's period.
    pub fn stream_number(&self) -> u64 {
        self.stream_number
    }

    /// Check if the last frame has been read.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn read_next(&mut self) -> TransportResult<Frame> {
        let mut sealed_header = [0u8; HEADER_LENGTH];
        read_exact_or_eof(&mut self.input, &mut sealed_header)?;
        let frame_number = self.next_frame;
        let header = self.decoder.decode_header_at(frame_number, &sealed_header)?;

        let body_limit = self.frame_length - HEADER_LENGTH;
        let mut sealed_body = Vec::with_capacity(body_limit);
        if header.last_frame {
            // The last frame runs to the end of the stream.
            (&mut self.input)
                .take(body_limit as u64 + 1)
                .read_to_end(&mut sealed_body)?;
            if sealed_body.len() > body_limit {
                return Err(FrameError::TooLong {
                    limit: self.frame_length,
                }
                .into());
            }
        } else {
            sealed_body.resize(body_limit, 0);
            read_exact_or_eof(&mut self.input, &mut sealed_body)?;
        }

        self.decoder
            .decode_body(frame_number, &header, &sealed_body)
    }
}

fn read_exact_or_eof<R: Read>(input: &mut R, buf: &mut [u8]) -> TransportResult<()> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            TransportError::UnexpectedEof
        } else {
            TransportError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::core::{MAX_FRAME_LENGTH, MAX_PAYLOAD_LENGTH};
    use crate::crypto::SECRET_KEY_SIZE;
    use crate::transport::FrameWriter;

    const FRAME_LENGTH: usize = 128;

    fn context(alice: bool) -> StreamContext {
        StreamContext::new(
            ContactId(3),
            TransportId::new("bt"),
            SecretKey::from_bytes([0x24; SECRET_KEY_SIZE]),
            11,
            alice,
        )
    }

    fn body_capacity(frame_length: usize) -> usize {
        frame_length - HEADER_LENGTH - MAC_LENGTH
    }

    /// Responder-side bytes written by alice, as bob would receive them.
    fn write_stream(frames: &[(&[u8], bool)], frame_length: usize) -> Vec<u8> {
        let mut writer =
            FrameWriter::responder(Vec::new(), &context(true), 64 * 1024, frame_length).unwrap();
        for (payload, last) in frames {
            let padding = if *last {
                0
            } else {
                body_capacity(frame_length) - payload.len()
            };
            writer.write_frame(payload, padding, *last).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn test_read_frames_in_order() {
        let frames = [
            (b"first".as_slice(), false),
            (b"second".as_slice(), false),
            (b"end".as_slice(), true),
        ];
        let bytes = write_stream(&frames, FRAME_LENGTH);
        let mut reader = FrameReader::new(Cursor::new(bytes), &context(false), FRAME_LENGTH).unwrap();

        let f0 = reader.read_frame().unwrap().unwrap();
        assert_eq!(f0.payload, b"first");
        assert_eq!(f0.frame_number, 0);
        assert!(!f0.last_frame);

        let f1 = reader.read_frame().unwrap().unwrap();
        assert_eq!(f1.payload, b"second");

        let f2 = reader.read_frame().unwrap().unwrap();
        assert_eq!(f2.payload, b"end");
        assert!(f2.last_frame);

        assert!(reader.read_frame().unwrap().is_none());
        assert!(reader.is_finished());
    }

    #[test]
    fn test_wrong_role_fails_authentication() {
        let bytes = write_stream(&[(b"hello".as_slice(), true)], FRAME_LENGTH);
        // Reading with the writer's own role derives the wrong frame key.
        let mut reader = FrameReader::new(Cursor::new(bytes), &context(true), FRAME_LENGTH).unwrap();
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, TransportError::AuthenticationFailed));
        assert!(err.is_silent_drop());
    }

    #[test]
    fn test_truncated_stream_is_error() {
        let frames = [(b"first".as_slice(), false), (b"end".as_slice(), true)];
        let bytes = write_stream(&frames, FRAME_LENGTH);
        let truncated = Cursor::new(bytes[..FRAME_LENGTH].to_vec());
        let mut reader = FrameReader::new(truncated, &context(false), FRAME_LENGTH).unwrap();

        reader.read_frame().unwrap().unwrap();
        assert!(matches!(reader.read_frame(), Err(TransportError::UnexpectedEof)));
        assert!(matches!(reader.read_frame(), Err(TransportError::KeysErased)));
    }

    #[test]
    fn test_trailing_data_after_last_frame_rejected() {
        let mut bytes = write_stream(&[([0x01u8; 90].as_slice(), true)], FRAME_LENGTH);
        bytes.extend_from_slice(&[0u8; 64]);
        let mut reader = FrameReader::new(Cursor::new(bytes), &context(false), FRAME_LENGTH).unwrap();
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, TransportError::Frame(FrameError::TooLong { limit: 128 })));
        assert!(err.is_silent_drop());
    }

    #[test]
    fn test_reader_rejects_swapped_frames() {
        let frames = [
            (b"zero".as_slice(), false),
            (b"one".as_slice(), false),
            (b"two".as_slice(), true),
        ];
        let bytes = write_stream(&frames, FRAME_LENGTH);
        let mut swapped = bytes[FRAME_LENGTH..2 * FRAME_LENGTH].to_vec();
        swapped.extend_from_slice(&bytes[..FRAME_LENGTH]);
        swapped.extend_from_slice(&bytes[2 * FRAME_LENGTH..]);

        let mut reader =
            FrameReader::new(Cursor::new(swapped), &context(false), FRAME_LENGTH).unwrap();
        assert!(matches!(
            reader.read_frame(),
            Err(TransportError::AuthenticationFailed)
        ));
        assert!(!reader.is_finished());
    }

    #[test]
    fn test_decode_header_at_pins_number() {
        let frames = [(b"zero".as_slice(), false), (b"one".as_slice(), true)];
        let bytes = write_stream(&frames, FRAME_LENGTH);
        let mut decoder = FrameDecoder::new(&context(false)).unwrap();
        let second = &bytes[FRAME_LENGTH..FRAME_LENGTH + HEADER_LENGTH];

        assert!(decoder.decode_header_at(0, second).is_err());
        let header = decoder.decode_header_at(1, second).unwrap();
        assert!(header.last_frame);

        decoder.decode_frame(&bytes[..FRAME_LENGTH]).unwrap();
        assert!(decoder.decode_header_at(0, &bytes[..HEADER_LENGTH]).is_err());
    }

    #[test]
    fn test_decoder_tolerates_reordering() {
        let bytes = write_stream(
            &[
                (b"zero".as_slice(), false),
                (b"one".as_slice(), false),
                (b"two".as_slice(), false),
                (b"three".as_slice(), true),
            ],
            FRAME_LENGTH,
        );
        let frames: Vec<&[u8]> = bytes.chunks(FRAME_LENGTH).collect();
        let mut decoder = FrameDecoder::new(&context(false)).unwrap();

        assert_eq!(decoder.decode_frame(frames[2]).unwrap().payload, b"two");
        assert_eq!(decoder.decode_frame(frames[0]).unwrap().payload, b"zero");
        assert_eq!(decoder.decode_frame(frames[1]).unwrap().payload, b"one");
        let last = decoder.decode_frame(frames[3]).unwrap();
        assert_eq!(last.frame_number, 3);
        assert!(last.last_frame);
    }

    #[test]
    fn test_decoder_rejects_replayed_frame() {
        let frames = [(b"zero".as_slice(), false), (b"one".as_slice(), true)];
        let bytes = write_stream(&frames, FRAME_LENGTH);
        let mut decoder = FrameDecoder::new(&context(false)).unwrap();

        decoder.decode_frame(&bytes[..FRAME_LENGTH]).unwrap();
        let err = decoder.decode_frame(&bytes[..FRAME_LENGTH]).unwrap_err();
        assert!(matches!(err, TransportError::AuthenticationFailed));
    }

    #[test]
    fn test_decoder_rejects_frame_outside_window() {
        let frame_length = 64;
        let mut writer =
            FrameWriter::responder(Vec::new(), &context(true), 64 * 1024, frame_length).unwrap();
        let padding = body_capacity(frame_length);
        for _ in 0..=crate::core::REORDERING_WINDOW_SIZE {
            writer.write_frame(&[], padding, false).unwrap();
        }
        let bytes = writer.into_inner();

        // Frame 32 lies beyond the window while frame 0 is unseen.
        let mut decoder = FrameDecoder::new(&context(false)).unwrap();
        let beyond = &bytes[32 * frame_length..33 * frame_length];
        assert!(matches!(
            decoder.decode_frame(beyond),
            Err(TransportError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_max_payload_roundtrip() {
        let payload = vec![0x5C; MAX_PAYLOAD_LENGTH];
        let frames = [(payload.as_slice(), false), (b"".as_slice(), true)];
        let bytes = write_stream(&frames, MAX_FRAME_LENGTH);
        let mut reader =
            FrameReader::new(Cursor::new(bytes), &context(false), MAX_FRAME_LENGTH).unwrap();

        assert_eq!(reader.read_frame().unwrap().unwrap().payload, payload);
        let last = reader.read_frame().unwrap().unwrap();
        assert!(last.payload.is_empty());
        assert!(last.last_frame);
    }
}
