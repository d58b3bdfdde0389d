//! Storage collaborator boundary.
//!
//! The node does not own a storage engine. Queries, truncation and drops go
//! through a [`StorageExecutor`]; mutations become [`Transactable`]s built
//! by a [`TransactionFactory`]. Both report failures as plain strings, like
//! any other external service.

use serde_json::Value;
use strand_core::{EventType, Transactable};
use strand_protocol::{primary_key, MutateRequest, MutationKind};

/// A batch of record changes against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Target datastore.
    pub ds: String,
    /// Target collection.
    pub collection: String,
    /// Kind of change.
    pub kind: MutationKind,
    /// Affected records; each carries its primary key.
    pub records: Vec<Value>,
}

impl Mutation {
    /// Creates a mutation.
    pub fn new(
        ds: impl Into<String>,
        collection: impl Into<String>,
        kind: MutationKind,
        records: Vec<Value>,
    ) -> Self {
        Self {
            ds: ds.into(),
            collection: collection.into(),
            kind,
            records,
        }
    }

    /// Primary keys of the records, in order. `None` if any record lacks one.
    pub fn primary_keys(&self) -> Option<Vec<String>> {
        self.records.iter().map(primary_key).collect()
    }

    /// Hook event type reported for this mutation.
    pub fn event_type(&self) -> EventType {
        match self.kind {
            MutationKind::Insert => EventType::Insert,
            MutationKind::Update => EventType::Update,
            MutationKind::Delete => EventType::Delete,
        }
    }
}

impl From<MutateRequest> for Mutation {
    fn from(request: MutateRequest) -> Self {
        Self {
            ds: request.ds,
            collection: request.collection,
            kind: request.event,
            records: request.records,
        }
    }
}

/// Executes non-transactional storage operations.
pub trait StorageExecutor: Send + Sync {
    /// Runs an opaque query against a datastore.
    fn execute_query(&self, ds: &str, query: &str) -> Result<Value, String>;

    /// Removes every record of a collection, returning how many were removed.
    fn truncate_collection(&self, ds: &str, collection: &str) -> Result<usize, String>;

    /// Removes a datastore. Returns false if it did not exist.
    fn drop_datastore(&self, ds: &str) -> Result<bool, String>;
}

/// Builds the transactional work behind a mutation.
pub trait TransactionFactory: Send + Sync {
    /// Creates a not-yet-executed transaction for `mutation`.
    fn create(&self, mutation: &Mutation) -> Result<Box<dyn Transactable>, String>;
}
