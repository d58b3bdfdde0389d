//! Typed packet bodies.

use crate::error::{DecodeError, ProtocolError, ProtocolResult};
use crate::header::PacketType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding a record's primary key.
pub const PRIMARY_KEY_FIELD: &str = "_id";

/// Returns the primary key of a record, if it has one.
///
/// String keys are returned verbatim, integer keys in decimal.
pub fn primary_key(record: &Value) -> Option<String> {
    match record.get(PRIMARY_KEY_FIELD)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Kind of record mutation carried by a [`MutateRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// New records.
    Insert,
    /// Replacement of existing records.
    Update,
    /// Removal of existing records.
    Delete,
}

/// Opaque query forwarded to the storage executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Client-chosen id echoed in the reply.
    pub request_id: u64,
    /// Target datastore.
    pub ds: String,
    /// Query text, not interpreted by this crate.
    pub query: String,
}

impl QueryRequest {
    /// Creates a new query request.
    pub fn new(request_id: u64, ds: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            request_id,
            ds: ds.into(),
            query: query.into(),
        }
    }
}

/// Record mutation to soft-execute under a transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutateRequest {
    /// Client-chosen id echoed in the reply.
    pub request_id: u64,
    /// Transaction id the mutation is registered under.
    pub tx_id: String,
    /// Target datastore.
    pub ds: String,
    /// Target collection.
    pub collection: String,
    /// Mutation kind.
    pub event: MutationKind,
    /// Affected records, each carrying a primary key.
    pub records: Vec<Value>,
}

impl MutateRequest {
    /// Creates a new mutation request.
    pub fn new(
        request_id: u64,
        tx_id: impl Into<String>,
        ds: impl Into<String>,
        collection: impl Into<String>,
        event: MutationKind,
        records: Vec<Value>,
    ) -> Self {
        Self {
            request_id,
            tx_id: tx_id.into(),
            ds: ds.into(),
            collection: collection.into(),
            event,
            records,
        }
    }
}

/// Commit or rollback of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    /// Client-chosen id echoed in the reply.
    pub request_id: u64,
    /// Transaction id.
    pub tx_id: String,
}

impl TxRequest {
    /// Creates a new transaction control request.
    pub fn new(request_id: u64, tx_id: impl Into<String>) -> Self {
        Self {
            request_id,
            tx_id: tx_id.into(),
        }
    }
}

/// Truncation of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncateRequest {
    /// Client-chosen id echoed in the reply.
    pub request_id: u64,
    /// Target datastore.
    pub ds: String,
    /// Target collection.
    pub collection: String,
}

impl TruncateRequest {
    /// Creates a new truncate request.
    pub fn new(request_id: u64, ds: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            request_id,
            ds: ds.into(),
            collection: collection.into(),
        }
    }
}

/// Removal of a whole datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropDatastoreRequest {
    /// Client-chosen id echoed in the reply.
    pub request_id: u64,
    /// Target datastore.
    pub ds: String,
}

impl DropDatastoreRequest {
    /// Creates a new drop request.
    pub fn new(request_id: u64, ds: impl Into<String>) -> Self {
        Self {
            request_id,
            ds: ds.into(),
        }
    }
}

/// Hook subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterHookRequest {
    /// Client-chosen id echoed in the reply.
    pub request_id: u64,
    /// Structured subscription payload (`id`, `ds`, `c`, `type`, `url`).
    pub hook: Value,
}

impl RegisterHookRequest {
    /// Creates a new hook registration request.
    pub fn new(request_id: u64, hook: Value) -> Self {
        Self { request_id, hook }
    }
}

/// Removal of a hook subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterHookRequest {
    /// Client-chosen id echoed in the reply.
    pub request_id: u64,
    /// Subscription id.
    pub hook_id: String,
}

impl UnregisterHookRequest {
    /// Creates a new hook removal request.
    pub fn new(request_id: u64, hook_id: impl Into<String>) -> Self {
        Self {
            request_id,
            hook_id: hook_id.into(),
        }
    }
}

/// Successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request being answered.
    pub request_id: u64,
    /// Reply payload.
    pub payload: Value,
}

impl Response {
    /// Creates a new response.
    pub fn new(request_id: u64, payload: Value) -> Self {
        Self {
            request_id,
            payload,
        }
    }
}

/// Error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Id of the request being answered, 0 when unknown.
    pub request_id: u64,
    /// Status-style error code.
    pub code: u16,
    /// Human readable message.
    pub message: String,
}

impl ErrorResponse {
    /// Creates a new error response.
    pub fn new(request_id: u64, code: u16, message: impl Into<String>) -> Self {
        Self {
            request_id,
            code,
            message: message.into(),
        }
    }
}

/// A decoded protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Query request.
    Query(QueryRequest),
    /// Mutation request.
    Mutate(MutateRequest),
    /// Commit request.
    Commit(TxRequest),
    /// Rollback request.
    Rollback(TxRequest),
    /// Truncate request.
    Truncate(TruncateRequest),
    /// Drop datastore request.
    DropDatastore(DropDatastoreRequest),
    /// Hook registration request.
    RegisterHook(RegisterHookRequest),
    /// Hook removal request.
    UnregisterHook(UnregisterHookRequest),
    /// Successful reply.
    Response(Response),
    /// Error reply.
    Error(ErrorResponse),
}

impl Packet {
    /// Returns the packet type.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Query(_) => PacketType::Query,
            Packet::Mutate(_) => PacketType::Mutate,
            Packet::Commit(_) => PacketType::Commit,
            Packet::Rollback(_) => PacketType::Rollback,
            Packet::Truncate(_) => PacketType::Truncate,
            Packet::DropDatastore(_) => PacketType::DropDatastore,
            Packet::RegisterHook(_) => PacketType::RegisterHook,
            Packet::UnregisterHook(_) => PacketType::UnregisterHook,
            Packet::Response(_) => PacketType::Response,
            Packet::Error(_) => PacketType::Error,
        }
    }

    /// Returns the request id carried by the packet.
    pub fn request_id(&self) -> u64 {
        match self {
            Packet::Query(p) => p.request_id,
            Packet::Mutate(p) => p.request_id,
            Packet::Commit(p) | Packet::Rollback(p) => p.request_id,
            Packet::Truncate(p) => p.request_id,
            Packet::DropDatastore(p) => p.request_id,
            Packet::RegisterHook(p) => p.request_id,
            Packet::UnregisterHook(p) => p.request_id,
            Packet::Response(p) => p.request_id,
            Packet::Error(p) => p.request_id,
        }
    }

    /// Encodes the body to CBOR (without header).
    pub fn encode_body(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            Packet::Query(p) => to_cbor(p),
            Packet::Mutate(p) => to_cbor(p),
            Packet::Commit(p) | Packet::Rollback(p) => to_cbor(p),
            Packet::Truncate(p) => to_cbor(p),
            Packet::DropDatastore(p) => to_cbor(p),
            Packet::RegisterHook(p) => to_cbor(p),
            Packet::UnregisterHook(p) => to_cbor(p),
            Packet::Response(p) => to_cbor(p),
            Packet::Error(p) => to_cbor(p),
        }
    }

    /// Decodes a body of the given type.
    pub fn decode_body(packet_type: PacketType, body: &[u8]) -> Result<Self, DecodeError> {
        let packet = match packet_type {
            PacketType::Query => Packet::Query(from_cbor(packet_type, body)?),
            PacketType::Mutate => Packet::Mutate(from_cbor(packet_type, body)?),
            PacketType::Commit => Packet::Commit(from_cbor(packet_type, body)?),
            PacketType::Rollback => Packet::Rollback(from_cbor(packet_type, body)?),
            PacketType::Truncate => Packet::Truncate(from_cbor(packet_type, body)?),
            PacketType::DropDatastore => Packet::DropDatastore(from_cbor(packet_type, body)?),
            PacketType::RegisterHook => Packet::RegisterHook(from_cbor(packet_type, body)?),
            PacketType::UnregisterHook => Packet::UnregisterHook(from_cbor(packet_type, body)?),
            PacketType::Response => Packet::Response(from_cbor(packet_type, body)?),
            PacketType::Error => Packet::Error(from_cbor(packet_type, body)?),
        };
        Ok(packet)
    }
}

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(packet_type: PacketType, body: &[u8]) -> Result<T, DecodeError> {
    ciborium::from_reader(body).map_err(|e| DecodeError::malformed(packet_type, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primary_key_forms() {
        assert_eq!(primary_key(&json!({"_id": "pk-1"})), Some("pk-1".into()));
        assert_eq!(primary_key(&json!({"_id": 42})), Some("42".into()));
        assert_eq!(primary_key(&json!({"_id": ""})), None);
        assert_eq!(primary_key(&json!({"_id": 1.5})), None);
        assert_eq!(primary_key(&json!({"name": "x"})), None);
        assert_eq!(primary_key(&json!("scalar")), None);
    }

    #[test]
    fn mutate_body_keeps_records_in_order() {
        let packet = Packet::Mutate(MutateRequest::new(
            7,
            "tx-1",
            "sales",
            "orders",
            MutationKind::Update,
            vec![json!({"_id": "a", "qty": 1}), json!({"_id": "b", "qty": 2})],
        ));
        let body = packet.encode_body().unwrap();
        let decoded = Packet::decode_body(PacketType::Mutate, &body).unwrap();

        assert_eq!(decoded, packet);
        assert_eq!(decoded.request_id(), 7);
    }

    #[test]
    fn mutation_kind_wire_names() {
        let body = to_cbor(&MutationKind::Delete).unwrap();
        let name: String = ciborium::from_reader(&body[..]).unwrap();
        assert_eq!(name, "delete");
    }

    #[test]
    fn body_of_wrong_type_is_malformed() {
        let body = Packet::Commit(TxRequest::new(1, "tx")).encode_body().unwrap();
        let err = Packet::decode_body(PacketType::Mutate, &body).unwrap_err();

        assert!(matches!(
            err,
            DecodeError::MalformedBody {
                packet_type: PacketType::Mutate,
                ..
            }
        ));
    }

    #[test]
    fn garbage_body_is_malformed() {
        let err = Packet::decode_body(PacketType::Query, &[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedBody { .. }));
    }

    #[test]
    fn packet_types_match_variants() {
        assert_eq!(
            Packet::Error(ErrorResponse::new(0, 400, "bad")).packet_type(),
            PacketType::Error
        );
        assert_eq!(
            Packet::Rollback(TxRequest::new(0, "t")).packet_type(),
            PacketType::Rollback
        );
        assert!(PacketType::Rollback.is_request());
        assert!(!PacketType::Response.is_request());
    }
}
