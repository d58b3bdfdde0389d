//! Transaction registry.

use crate::error::{CoreError, CoreResult};
use crate::transaction::state::Transactable;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A transactable shared between the registry and the request path.
pub type SharedTransactable = Arc<dyn Transactable>;

/// Maps transaction ids to the single live transaction for each.
///
/// Individual operations are atomic. Sequences such as "get, commit,
/// unregister" are not; callers claim an id with [`try_register`] and
/// release it with [`unregister_if`] so that a stale holder never removes
/// someone else's entry.
///
/// [`try_register`]: TransactionRegistry::try_register
/// [`unregister_if`]: TransactionRegistry::unregister_if
#[derive(Default)]
pub struct TransactionRegistry {
    entries: RwLock<HashMap<String, SharedTransactable>>,
}

impl TransactionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transactable` under `id`.
    ///
    /// An existing entry for the same id is replaced and returned.
    pub fn register(
        &self,
        id: impl Into<String>,
        transactable: SharedTransactable,
    ) -> Option<SharedTransactable> {
        let id = id.into();
        debug!(tx_id = %id, "registering transaction");
        let previous = self.entries.write().insert(id.clone(), transactable);
        if previous.is_some() {
            warn!(tx_id = %id, "transaction id reused; previous entry replaced");
        }
        previous
    }

    /// Registers `transactable` under `id` unless the id is already live.
    ///
    /// Returns false, leaving the registry untouched, when another
    /// transaction holds the id.
    pub fn try_register(&self, id: impl Into<String>, transactable: SharedTransactable) -> bool {
        let id = id.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            debug!(tx_id = %id, "transaction id already live");
            return false;
        }
        debug!(tx_id = %id, "registering transaction");
        entries.insert(id, transactable);
        true
    }

    /// Removes the entry for `id` only if it is `transactable` itself.
    ///
    /// Returns true if the entry was removed.
    pub fn unregister_if(&self, id: &str, transactable: &SharedTransactable) -> bool {
        let mut entries = self.entries.write();
        match entries.get(id) {
            Some(current) if Arc::ptr_eq(current, transactable) => {
                entries.remove(id);
                debug!(tx_id = %id, "unregistered transaction");
                true
            }
            _ => false,
        }
    }

    /// Removes the entry for `id`, if any.
    pub fn unregister(&self, id: &str) -> Option<SharedTransactable> {
        let removed = self.entries.write().remove(id);
        if removed.is_some() {
            debug!(tx_id = %id, "unregistered transaction");
        }
        removed
    }

    /// Returns the transaction registered under `id`.
    pub fn get(&self, id: &str) -> Option<SharedTransactable> {
        self.entries.read().get(id).cloned()
    }

    /// Returns the transaction registered under `id`, or an error.
    ///
    /// Use this where the transaction must exist for the request to
    /// proceed.
    pub fn require(&self, id: &str) -> CoreResult<SharedTransactable> {
        self.get(id)
            .ok_or_else(|| CoreError::unknown_transaction(id))
    }

    /// Returns true if a transaction is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Number of live transactions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no transaction is live.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Ids of live transactions, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for TransactionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
