//! # Strand Protocol
//!
//! Binary wire protocol for Strand nodes.
//!
//! This crate provides:
//! - The fixed-size frame [`Header`] and its [`PacketType`] discriminator
//! - Typed [`Packet`] bodies (requests, responses, errors)
//! - [`FrameDecoder`], a per-connection stream decoder that turns an
//!   accumulating byte buffer into packets or [`DecodeError`] values
//! - [`encode_frame`] for the reverse direction
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire Format
//!
//! ```text
//! [magic "SP" (2)] [version (1)] [type (1)] [length u32 LE (4)] [body (length - 8)]
//! ```
//!
//! Bodies are CBOR maps.
//!
//! ## Usage
//!
//! ```
//! use strand_protocol::{encode_frame, FrameDecoder, Packet, TxRequest};
//!
//! let frame = encode_frame(&Packet::Commit(TxRequest::new(1, "tx-1"))).unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.feed(&frame[..3]);
//! assert!(decoder.decode_next().is_none());
//!
//! decoder.feed(&frame[3..]);
//! let packet = decoder.decode_next().unwrap().unwrap();
//! assert_eq!(packet.request_id(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod codec;
mod error;
mod header;
mod packet;

pub use codec::{encode_frame, FrameDecoder};
pub use error::{DecodeError, ProtocolError, ProtocolResult};
pub use header::{Header, PacketType, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE, MAGIC, PROTOCOL_VERSION};
pub use packet::{
    primary_key, DropDatastoreRequest, ErrorResponse, MutateRequest, MutationKind, Packet,
    QueryRequest, RegisterHookRequest, Response, TruncateRequest, TxRequest,
    UnregisterHookRequest, PRIMARY_KEY_FIELD,
};
