//! Frame header.

use crate::error::DecodeError;
use crate::packet::Packet;

/// Magic bytes opening every frame.
pub const MAGIC: [u8; 2] = *b"SP";

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Header size in bytes.
/// magic (2) + version (1) + type (1) + length (4) = 8 bytes
pub const HEADER_SIZE: usize = 8;

/// Default upper bound on a single frame, header included.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16 MB

/// Type discriminator carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Opaque query forwarded to the storage executor.
    Query = 1,
    /// Soft-executed record mutation under a transaction id.
    Mutate = 2,
    /// Commit a soft-executed transaction.
    Commit = 3,
    /// Roll back a soft-executed transaction.
    Rollback = 4,
    /// Truncate a collection.
    Truncate = 5,
    /// Drop a whole datastore.
    DropDatastore = 6,
    /// Register a hook subscription.
    RegisterHook = 7,
    /// Remove a hook subscription.
    UnregisterHook = 8,
    /// Successful reply.
    Response = 64,
    /// Error reply.
    Error = 127,
}

impl PacketType {
    /// Converts a byte to a packet type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Query),
            2 => Some(Self::Mutate),
            3 => Some(Self::Commit),
            4 => Some(Self::Rollback),
            5 => Some(Self::Truncate),
            6 => Some(Self::DropDatastore),
            7 => Some(Self::RegisterHook),
            8 => Some(Self::UnregisterHook),
            64 => Some(Self::Response),
            127 => Some(Self::Error),
            _ => None,
        }
    }

    /// Converts the packet type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns true for packets a client sends to a node.
    pub fn is_request(self) -> bool {
        !matches!(self, Self::Response | Self::Error)
    }
}

/// Fixed-size frame header.
///
/// The header declares the total frame length (header included) and
/// selects the body decoder. The type tag is kept raw so that a frame
/// with an unknown tag can still be measured and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    type_code: u8,
    length: u32,
}

impl Header {
    /// Creates a header for a frame of `length` total bytes.
    pub fn new(packet_type: PacketType, length: u32) -> Self {
        Self {
            type_code: packet_type.as_byte(),
            length,
        }
    }

    /// Parses a header from its wire form.
    ///
    /// Only structural checks happen here; the type tag is validated
    /// when the body is decoded.
    ///
    /// # Errors
    ///
    /// Returns an error for a bad magic, an unsupported version or a
    /// declared length below [`HEADER_SIZE`].
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self, DecodeError> {
        let found = [bytes[0], bytes[1]];
        if found != MAGIC {
            return Err(DecodeError::BadMagic { found });
        }
        if bytes[2] != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(bytes[2]));
        }

        let type_code = bytes[3];
        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if (length as usize) < HEADER_SIZE {
            return Err(DecodeError::LengthTooSmall { declared: length });
        }

        Ok(Self { type_code, length })
    }

    /// Encodes the header to its wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..2].copy_from_slice(&MAGIC);
        out[2] = PROTOCOL_VERSION;
        out[3] = self.type_code;
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    /// Raw type tag.
    pub fn type_code(&self) -> u8 {
        self.type_code
    }

    /// Packet type, if the tag is known.
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_byte(self.type_code)
    }

    /// Declared length as carried on the wire.
    pub fn declared_length(&self) -> u32 {
        self.length
    }

    /// Total frame length in bytes, header included.
    pub fn frame_len(&self) -> usize {
        self.length as usize
    }

    /// Body length in bytes; zero for a length below the header size.
    pub fn body_len(&self) -> usize {
        self.frame_len().saturating_sub(HEADER_SIZE)
    }

    /// Builds the typed packet from the body bytes of this frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownPacketType`] for an unknown tag and
    /// [`DecodeError::MalformedBody`] when the body does not parse.
    pub fn decode_body(&self, body: &[u8]) -> Result<Packet, DecodeError> {
        let packet_type = self
            .packet_type()
            .ok_or(DecodeError::UnknownPacketType(self.type_code))?;
        Packet::decode_body(packet_type, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_roundtrip() {
        for t in [
            PacketType::Query,
            PacketType::Mutate,
            PacketType::Commit,
            PacketType::Rollback,
            PacketType::Truncate,
            PacketType::DropDatastore,
            PacketType::RegisterHook,
            PacketType::UnregisterHook,
            PacketType::Response,
            PacketType::Error,
        ] {
            assert_eq!(PacketType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(PacketType::from_byte(0), None);
        assert_eq!(PacketType::from_byte(200), None);
    }

    #[test]
    fn header_layout() {
        let header = Header::new(PacketType::Commit, 42);
        let bytes = header.encode();

        assert_eq!(&bytes[0..2], b"SP");
        assert_eq!(bytes[2], PROTOCOL_VERSION);
        assert_eq!(bytes[3], 3);
        assert_eq!(&bytes[4..8], &42u32.to_le_bytes());
        assert_eq!(Header::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Header::new(PacketType::Query, 8).encode();
        bytes[0] = b'X';
        assert_eq!(
            Header::parse(&bytes),
            Err(DecodeError::BadMagic { found: [b'X', b'P'] })
        );
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = Header::new(PacketType::Query, 8).encode();
        bytes[2] = 9;
        assert_eq!(Header::parse(&bytes), Err(DecodeError::UnsupportedVersion(9)));
    }

    #[test]
    fn rejects_length_below_header() {
        let bytes = Header::new(PacketType::Query, 7).encode();
        assert_eq!(
            Header::parse(&bytes),
            Err(DecodeError::LengthTooSmall { declared: 7 })
        );
    }

    #[test]
    fn short_declared_length_has_empty_body() {
        let header = Header::new(PacketType::Query, 3);
        assert_eq!(header.frame_len(), 3);
        assert_eq!(header.body_len(), 0);
    }

    #[test]
    fn unknown_type_parses_but_fails_body() {
        let mut bytes = Header::new(PacketType::Query, 8).encode();
        bytes[3] = 0xEE;
        let header = Header::parse(&bytes).unwrap();

        assert_eq!(header.packet_type(), None);
        assert_eq!(header.body_len(), 0);
        assert_eq!(
            header.decode_body(&[]),
            Err(DecodeError::UnknownPacketType(0xEE))
        );
    }
}
