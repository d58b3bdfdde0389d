//! Error types for the protocol crate.

use crate::header::PacketType;
use thiserror::Error;

/// Result type for encoding operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding a packet for the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The body could not be serialized.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// The encoded frame does not fit the 32-bit length field.
    #[error("frame too large to encode: {size} bytes")]
    FrameTooLarge {
        /// Size of the frame that was rejected.
        size: usize,
    },
}

impl ProtocolError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }
}

/// A framing or body error produced by the decoder.
///
/// Decode errors are values, not control flow: the [`FrameDecoder`]
/// emits them in-sequence where a packet would have been, so the
/// connection handler can answer with a protocol error.
///
/// [`FrameDecoder`]: crate::FrameDecoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Header does not start with the protocol magic.
    #[error("bad frame magic: {found:02x?}")]
    BadMagic {
        /// The two bytes found in place of the magic.
        found: [u8; 2],
    },

    /// Header carries a protocol version this node does not speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Header declares a length smaller than the header itself.
    #[error("declared frame length {declared} is smaller than the header")]
    LengthTooSmall {
        /// Declared total frame length.
        declared: u32,
    },

    /// Header declares a frame larger than the configured limit.
    #[error("declared frame length {declared} exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Declared total frame length.
        declared: u32,
        /// Configured maximum frame size.
        max: usize,
    },

    /// Header carries a type tag with no known body parser.
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// Body bytes could not be parsed as the declared packet type.
    #[error("malformed {packet_type:?} body: {message}")]
    MalformedBody {
        /// Declared packet type.
        packet_type: PacketType,
        /// Description of the parse failure.
        message: String,
    },
}

impl DecodeError {
    /// Returns true if the stream cannot be resynchronised after this error.
    ///
    /// Once the header itself is untrustworthy the declared length cannot
    /// be used to find the next frame boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecodeError::BadMagic { .. }
                | DecodeError::UnsupportedVersion(_)
                | DecodeError::LengthTooSmall { .. }
                | DecodeError::FrameTooLarge { .. }
        )
    }

    pub(crate) fn malformed(packet_type: PacketType, message: impl Into<String>) -> Self {
        Self::MalformedBody {
            packet_type,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(DecodeError::BadMagic { found: [0, 0] }.is_fatal());
        assert!(DecodeError::LengthTooSmall { declared: 3 }.is_fatal());
        assert!(!DecodeError::UnknownPacketType(99).is_fatal());
        assert!(!DecodeError::malformed(PacketType::Query, "eof").is_fatal());
    }

    #[test]
    fn error_display() {
        let err = DecodeError::FrameTooLarge {
            declared: 4096,
            max: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("1024"));
    }
}
