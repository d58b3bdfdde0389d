//! Hook event envelopes.

use crate::error::CoreResult;
use crate::hook::model::HookKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type of mutation an envelope reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Records were inserted.
    Insert,
    /// Records were updated.
    Update,
    /// Records were deleted.
    Delete,
    /// A collection was truncated.
    Truncate,
    /// A datastore was dropped.
    Drop,
}

/// Records affected by a mutation, one or many.
///
/// Both forms normalize to a list in the envelope so subscribers see one
/// schema regardless of batch size.
#[derive(Debug, Clone, PartialEq)]
pub enum AffectedRecords {
    /// A single record.
    One(Value),
    /// A batch of records, in order.
    Many(Vec<Value>),
}

impl AffectedRecords {
    fn into_vec(self) -> Vec<Value> {
        match self {
            AffectedRecords::One(record) => vec![record],
            AffectedRecords::Many(records) => records,
        }
    }
}

impl From<Value> for AffectedRecords {
    fn from(record: Value) -> Self {
        AffectedRecords::One(record)
    }
}

impl From<Vec<Value>> for AffectedRecords {
    fn from(records: Vec<Value>) -> Self {
        AffectedRecords::Many(records)
    }
}

/// Payload delivered to a hook subscriber.
///
/// Built fresh for every dispatch and never mutated afterwards.
///
/// ```json
/// { "type": "event-hook", "event": "update", "ds": "sales",
///   "c": "orders", "payload": [ { "_id": "pk-42" } ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEnvelope {
    #[serde(rename = "type")]
    kind: HookKind,
    event: EventType,
    ds: String,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
    payload: Vec<Value>,
}

impl HookEnvelope {
    /// Packages a mutation for hooks of `kind`.
    pub fn package(
        kind: HookKind,
        event: EventType,
        ds: impl Into<String>,
        collection: Option<&str>,
        records: impl Into<AffectedRecords>,
    ) -> Self {
        Self {
            kind,
            event,
            ds: ds.into(),
            collection: collection.map(str::to_string),
            payload: records.into().into_vec(),
        }
    }

    /// Same envelope, tagged for hooks of another kind.
    pub fn for_kind(&self, kind: HookKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Message kind tag.
    pub fn kind(&self) -> HookKind {
        self.kind
    }

    /// Event type tag.
    pub fn event(&self) -> EventType {
        self.event
    }

    /// Target datastore.
    pub fn ds(&self) -> &str {
        &self.ds
    }

    /// Target collection, if the event concerns one.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Affected records, in order.
    pub fn records(&self) -> &[Value] {
        &self.payload
    }

    /// Serializes the envelope to JSON bytes.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Serializes the envelope to a JSON value.
    pub fn to_json(&self) -> CoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
