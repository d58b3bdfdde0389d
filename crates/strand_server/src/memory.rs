//! In-memory storage backend.

use crate::executor::{Mutation, StorageExecutor, TransactionFactory};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strand_core::Transactable;
use strand_protocol::MutationKind;
use tracing::debug;

/// collection -> primary key -> record
type Datastore = HashMap<String, BTreeMap<String, Value>>;

/// A storage backend that keeps every datastore in memory.
///
/// Used by `strand serve` and by tests. Queries understand a minimal
/// addressing form rather than a query language:
///
/// - `""` lists collection names in the datastore
/// - `"orders"` returns every record of `orders`, ordered by primary key
/// - `"orders/pk-42"` returns one record, or `null`
///
/// Cloning shares the underlying data.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, Datastore>>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a record by primary key.
    pub fn record(&self, ds: &str, collection: &str, pk: &str) -> Option<Value> {
        self.data
            .read()
            .get(ds)
            .and_then(|d| d.get(collection))
            .and_then(|c| c.get(pk))
            .cloned()
    }

    /// Number of records in a collection.
    pub fn count(&self, ds: &str, collection: &str) -> usize {
        self.data
            .read()
            .get(ds)
            .and_then(|d| d.get(collection))
            .map_or(0, BTreeMap::len)
    }

    /// Returns true if the datastore exists.
    pub fn has_datastore(&self, ds: &str) -> bool {
        self.data.read().contains_key(ds)
    }
}

impl StorageExecutor for MemoryStorage {
    fn execute_query(&self, ds: &str, query: &str) -> Result<Value, String> {
        let data = self.data.read();
        let datastore = data
            .get(ds)
            .ok_or_else(|| format!("unknown datastore: {ds}"))?;

        let query = query.trim();
        if query.is_empty() {
            let mut names: Vec<&String> = datastore.keys().collect();
            names.sort();
            return Ok(Value::from(
                names.into_iter().cloned().map(Value::from).collect::<Vec<_>>(),
            ));
        }

        match query.split_once('/') {
            Some((collection, pk)) => Ok(datastore
                .get(collection)
                .and_then(|c| c.get(pk))
                .cloned()
                .unwrap_or(Value::Null)),
            None => Ok(Value::from(
                datastore
                    .get(query)
                    .map(|c| c.values().cloned().collect::<Vec<_>>())
                    .unwrap_or_default(),
            )),
        }
    }

    fn truncate_collection(&self, ds: &str, collection: &str) -> Result<usize, String> {
        let mut data = self.data.write();
        let removed = data
            .get_mut(ds)
            .and_then(|d| d.remove(collection))
            .map_or(0, |c| c.len());
        debug!(ds, collection, removed, "truncated collection");
        Ok(removed)
    }

    fn drop_datastore(&self, ds: &str) -> Result<bool, String> {
        Ok(self.data.write().remove(ds).is_some())
    }
}

impl TransactionFactory for MemoryStorage {
    fn create(&self, mutation: &Mutation) -> Result<Box<dyn Transactable>, String> {
        let keys = mutation
            .primary_keys()
            .ok_or_else(|| "record without primary key".to_string())?;
        let writes = keys.into_iter().zip(mutation.records.iter().cloned()).collect();
        Ok(Box::new(MemoryTransaction {
            storage: self.clone(),
            ds: mutation.ds.clone(),
            collection: mutation.collection.clone(),
            kind: mutation.kind,
            writes,
            staged: Mutex::new(None),
        }))
    }
}

/// A mutation staged against [`MemoryStorage`].
///
/// Soft-execute validates the batch and stages the writes without touching
/// the store; commit applies them.
struct MemoryTransaction {
    storage: MemoryStorage,
    ds: String,
    collection: String,
    kind: MutationKind,
    writes: Vec<(String, Value)>,
    staged: Mutex<Option<Vec<(String, Option<Value>)>>>,
}

impl MemoryTransaction {
    fn stage(&self) -> Option<Vec<(String, Option<Value>)>> {
        let data = self.storage.data.read();
        let existing = data.get(&self.ds).and_then(|d| d.get(&self.collection));
        let present = |pk: &str| existing.is_some_and(|c| c.contains_key(pk));

        let mut seen = std::collections::HashSet::new();
        let mut staged = Vec::with_capacity(self.writes.len());
        for (pk, record) in &self.writes {
            if !seen.insert(pk.as_str()) {
                return None;
            }
            let write = match self.kind {
                MutationKind::Insert if !present(pk) => Some(record.clone()),
                MutationKind::Update if present(pk) => Some(record.clone()),
                MutationKind::Delete if present(pk) => None,
                _ => return None,
            };
            staged.push((pk.clone(), write));
        }
        Some(staged)
    }
}

impl Transactable for MemoryTransaction {
    fn soft_execute(&self) -> bool {
        match self.stage() {
            Some(staged) => {
                *self.staged.lock() = Some(staged);
                true
            }
            None => false,
        }
    }

    fn commit(&self) -> bool {
        let Some(staged) = self.staged.lock().take() else {
            return false;
        };
        let mut data = self.storage.data.write();
        let collection = data
            .entry(self.ds.clone())
            .or_default()
            .entry(self.collection.clone())
            .or_default();
        for (pk, write) in staged {
            match write {
                Some(record) => {
                    collection.insert(pk, record);
                }
                None => {
                    collection.remove(&pk);
                }
            }
        }
        true
    }

    fn rollback(&self) -> bool {
        self.staged.lock().take();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mutate(storage: &MemoryStorage, kind: MutationKind, records: Vec<Value>) -> bool {
        let tx = storage
            .create(&Mutation::new("sales", "orders", kind, records))
            .unwrap();
        tx.soft_execute() && tx.commit()
    }

    #[test]
    fn soft_execute_has_no_visible_effect() {
        let storage = MemoryStorage::new();
        let tx = storage
            .create(&Mutation::new(
                "sales",
                "orders",
                MutationKind::Insert,
                vec![json!({"_id": "pk-42", "qty": 1})],
            ))
            .unwrap();

        assert!(tx.soft_execute());
        assert!(storage.record("sales", "orders", "pk-42").is_none());
        assert!(tx.rollback());
        assert!(!tx.commit());
        assert!(!storage.has_datastore("sales"));
    }

    #[test]
    fn insert_update_delete() {
        let storage = MemoryStorage::new();
        assert!(mutate(&storage, MutationKind::Insert, vec![json!({"_id": "a", "v": 1})]));
        assert!(!mutate(&storage, MutationKind::Insert, vec![json!({"_id": "a", "v": 2})]));

        assert!(mutate(&storage, MutationKind::Update, vec![json!({"_id": "a", "v": 3})]));
        assert_eq!(storage.record("sales", "orders", "a").unwrap()["v"], 3);
        assert!(!mutate(&storage, MutationKind::Update, vec![json!({"_id": "zz"})]));

        assert!(mutate(&storage, MutationKind::Delete, vec![json!({"_id": "a"})]));
        assert_eq!(storage.count("sales", "orders"), 0);
    }

    #[test]
    fn duplicate_keys_in_batch_fail() {
        let storage = MemoryStorage::new();
        assert!(!mutate(
            &storage,
            MutationKind::Insert,
            vec![json!({"_id": "a"}), json!({"_id": "a"})]
        ));
    }

    #[test]
    fn create_requires_primary_keys() {
        let storage = MemoryStorage::new();
        let result = storage.create(&Mutation::new(
            "sales",
            "orders",
            MutationKind::Insert,
            vec![json!({"qty": 1})],
        ));
        assert!(result.is_err());
    }

    #[test]
    fn queries() {
        let storage = MemoryStorage::new();
        assert!(storage.execute_query("sales", "orders").is_err());

        mutate(
            &storage,
            MutationKind::Insert,
            vec![json!({"_id": "b"}), json!({"_id": "a"})],
        );
        assert_eq!(storage.execute_query("sales", "").unwrap(), json!(["orders"]));
        assert_eq!(
            storage.execute_query("sales", "orders").unwrap(),
            json!([{"_id": "a"}, {"_id": "b"}])
        );
        assert_eq!(
            storage.execute_query("sales", "orders/b").unwrap(),
            json!({"_id": "b"})
        );
        assert_eq!(storage.execute_query("sales", "orders/x").unwrap(), Value::Null);
        assert_eq!(storage.execute_query("sales", "other").unwrap(), json!([]));
    }

    #[test]
    fn truncate_and_drop() {
        let storage = MemoryStorage::new();
        mutate(
            &storage,
            MutationKind::Insert,
            vec![json!({"_id": "a"}), json!({"_id": "b"})],
        );

        assert_eq!(storage.truncate_collection("sales", "orders").unwrap(), 2);
        assert_eq!(storage.truncate_collection("sales", "orders").unwrap(), 0);
        assert!(storage.drop_datastore("sales").unwrap());
        assert!(!storage.drop_datastore("sales").unwrap());
    }
}
