//! Hook subscription model.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Category of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookKind {
    /// Notified on ordinary data-change events.
    #[serde(rename = "event-hook")]
    Event,
    /// Notified as part of a transaction's lifecycle.
    #[serde(rename = "transaction-hook")]
    Transaction,
}

impl HookKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::Event => "event-hook",
            HookKind::Transaction => "transaction-hook",
        }
    }

    /// Parses a wire name; unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "event-hook" => Some(HookKind::Event),
            "transaction-hook" => Some(HookKind::Transaction),
            _ => None,
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured subscription payload as it appears on the wire.
///
/// All fields are optional here; [`Hook::from_payload`] enforces which
/// ones are required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookPayload {
    /// Subscription id; absent on create-intent payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Target datastore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ds: Option<String>,
    /// Target collection; absent means every collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<String>,
    /// Hook kind name.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Delivery endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A validated, immutable hook subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    id: Option<String>,
    ds: Option<String>,
    collection: Option<String>,
    kind: HookKind,
    url: String,
}

impl Hook {
    /// Creates a hook with no id and no target.
    pub fn new(kind: HookKind, url: impl Into<String>) -> Self {
        Self {
            id: None,
            ds: None,
            collection: None,
            kind,
            url: url.into(),
        }
    }

    /// Sets the id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the target datastore.
    pub fn with_ds(mut self, ds: impl Into<String>) -> Self {
        self.ds = Some(ds.into());
        self
    }

    /// Narrows the hook to one collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Builds a hook from a subscription payload.
    ///
    /// # Errors
    ///
    /// Fails when `type` is missing or unrecognized, or `url` is missing.
    pub fn from_payload(payload: HookPayload) -> CoreResult<Self> {
        let kind_name = payload
            .kind
            .ok_or_else(|| CoreError::invalid_hook("missing type"))?;
        let kind = HookKind::parse(&kind_name)
            .ok_or_else(|| CoreError::invalid_hook(format!("unrecognized type: {kind_name}")))?;
        let url = payload
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CoreError::invalid_hook("missing url"))?;

        Ok(Self {
            id: payload.id,
            ds: payload.ds,
            collection: payload.c,
            kind,
            url,
        })
    }

    /// Builds a hook from a JSON subscription object.
    pub fn from_json(value: &Value) -> CoreResult<Self> {
        let payload: HookPayload = serde_json::from_value(value.clone())
            .map_err(|e| CoreError::invalid_hook(e.to_string()))?;
        Self::from_payload(payload)
    }

    /// Returns the subscription payload for this hook.
    pub fn to_payload(&self) -> HookPayload {
        HookPayload {
            id: self.id.clone(),
            ds: self.ds.clone(),
            c: self.collection.clone(),
            kind: Some(self.kind.as_str().to_string()),
            url: Some(self.url.clone()),
        }
    }

    /// Returns the subscription payload as JSON.
    pub fn to_json(&self) -> CoreResult<Value> {
        Ok(serde_json::to_value(self.to_payload())?)
    }

    /// Subscription id, if assigned.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Target datastore.
    pub fn ds(&self) -> Option<&str> {
        self.ds.as_deref()
    }

    /// Target collection; `None` matches every collection.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Hook kind.
    pub fn kind(&self) -> HookKind {
        self.kind
    }

    /// Delivery endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn placed(mut self, id: String, ds: &str, collection: Option<&str>) -> Self {
        self.id = Some(id);
        self.ds = Some(ds.to_string());
        self.collection = collection.map(str::to_string);
        self
    }
}
