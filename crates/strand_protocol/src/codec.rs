//! Stream framing.
//!
//! [`FrameDecoder`] turns an accumulating byte buffer into a sequence of
//! `Result<Packet, DecodeError>` items, one per frame, in arrival order.
//! It never blocks: when the buffer holds less than a full frame it
//! returns `None` and keeps the bytes for the next call.

use crate::error::{DecodeError, ProtocolError, ProtocolResult};
use crate::header::{Header, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use crate::packet::Packet;
use bytes::BytesMut;

/// Encodes a packet into a complete frame (`header || body`).
///
/// # Errors
///
/// Returns an error if the body cannot be serialized or the frame does
/// not fit the 32-bit length field.
pub fn encode_frame(packet: &Packet) -> ProtocolResult<Vec<u8>> {
    let body = packet.encode_body()?;
    let total = HEADER_SIZE + body.len();
    let length = u32::try_from(total).map_err(|_| ProtocolError::FrameTooLarge { size: total })?;

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&Header::new(packet.packet_type(), length).encode());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Per-connection frame decoder.
///
/// The decoder holds no state beyond its byte accumulator and limits, so
/// every connection needs its own instance.
///
/// ## Error recovery
///
/// - Unknown type tag or unparsable body: the declared frame is consumed
///   and the next frame decodes normally.
/// - Bad magic, unsupported version, length below the header size or above
///   the frame limit: the frame boundary is lost. One error is emitted, the
///   buffer is dropped and the decoder stays poisoned; later input is
///   discarded.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
    poisoned: bool,
}

impl FrameDecoder {
    /// Creates a decoder with the default frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a decoder rejecting frames larger than `max_frame_size`.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size: max_frame_size.max(HEADER_SIZE),
            poisoned: false,
        }
    }

    /// Appends bytes read from the stream.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.poisoned {
            return;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Decodes the next complete frame.
    ///
    /// Returns `None` when more input is needed. Nothing is consumed in
    /// that case.
    pub fn decode_next(&mut self) -> Option<Result<Packet, DecodeError>> {
        if self.poisoned || self.buffer.len() < HEADER_SIZE {
            return None;
        }

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.buffer[..HEADER_SIZE]);
        let header = match Header::parse(&raw) {
            Ok(header) => header,
            Err(err) => return Some(Err(self.poison(err))),
        };

        let frame_len = header.frame_len();
        if frame_len > self.max_frame_size {
            let err = DecodeError::FrameTooLarge {
                declared: header.declared_length(),
                max: self.max_frame_size,
            };
            return Some(Err(self.poison(err)));
        }

        // Wait for the rest of the declared frame.
        if self.buffer.len() < frame_len {
            return None;
        }

        let frame = self.buffer.split_to(frame_len);
        Some(header.decode_body(&frame[HEADER_SIZE..]))
    }

    /// Feeds `bytes` and drains every complete frame.
    pub fn decode_all(&mut self, bytes: &[u8]) -> Vec<Result<Packet, DecodeError>> {
        self.feed(bytes);
        let mut out = Vec::new();
        while let Some(item) = self.decode_next() {
            out.push(item);
        }
        out
    }

    /// Number of bytes waiting for a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true once a fatal framing error has been emitted.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns the configured frame limit.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn poison(&mut self, err: DecodeError) -> DecodeError {
        self.poisoned = true;
        self.buffer.clear();
        err
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
