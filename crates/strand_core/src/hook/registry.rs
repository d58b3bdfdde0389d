//! Hook registry.

use crate::error::{CoreError, CoreResult};
use crate::hook::model::{Hook, HookKind};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

/// collection (`None` = every collection) -> id -> hook
type CollectionIndex = HashMap<Option<String>, BTreeMap<String, Hook>>;

#[derive(Default)]
struct Indexes {
    by_id: HashMap<String, Hook>,
    event: HashMap<String, CollectionIndex>,
    transaction: HashMap<String, CollectionIndex>,
}

impl Indexes {
    fn nested(&mut self, kind: HookKind) -> &mut HashMap<String, CollectionIndex> {
        match kind {
            HookKind::Event => &mut self.event,
            HookKind::Transaction => &mut self.transaction,
        }
    }

    fn remove(&mut self, id: &str) -> Option<Hook> {
        let hook = self.by_id.remove(id)?;
        let ds = hook.ds().unwrap_or_default().to_string();
        let collection = hook.collection().map(str::to_string);

        let nested = self.nested(hook.kind());
        if let Some(collections) = nested.get_mut(&ds) {
            if let Some(bucket) = collections.get_mut(&collection) {
                bucket.remove(id);
                if bucket.is_empty() {
                    collections.remove(&collection);
                }
            }
            if collections.is_empty() {
                nested.remove(&ds);
            }
        }
        Some(hook)
    }

    fn matching(&self, kind: HookKind, ds: &str, collection: Option<&str>) -> Vec<Hook> {
        let nested = match kind {
            HookKind::Event => &self.event,
            HookKind::Transaction => &self.transaction,
        };
        let Some(collections) = nested.get(ds) else {
            return Vec::new();
        };

        let mut hooks: Vec<Hook> = match collection {
            Some(c) => [Some(c.to_string()), None]
                .iter()
                .filter_map(|key| collections.get(key))
                .flat_map(|bucket| bucket.values().cloned())
                .collect(),
            None => collections
                .values()
                .flat_map(|bucket| bucket.values().cloned())
                .collect(),
        };
        hooks.sort_by(|a, b| a.id().cmp(&b.id()));
        hooks
    }
}

/// Stores hook subscriptions.
///
/// Each hook is reachable by id and from exactly one nested index keyed by
/// its own (datastore, collection, kind). Registering an id that is already
/// present replaces the earlier subscription everywhere.
#[derive(Default)]
pub struct HookRegistry {
    inner: RwLock<Indexes>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook under its own datastore and collection.
    ///
    /// # Errors
    ///
    /// Fails if the hook has no target datastore.
    pub fn register(&self, hook: Hook) -> CoreResult<Hook> {
        let ds = hook
            .ds()
            .map(str::to_string)
            .ok_or_else(|| CoreError::invalid_hook("missing ds"))?;
        let collection = hook.collection().map(str::to_string);
        Ok(self.register_hook(&ds, collection.as_deref(), hook))
    }

    /// Registers `hook` for `ds` and, optionally, one collection.
    ///
    /// A hook without an id is given a fresh one. The stored hook, with
    /// its id and target filled in, is returned.
    pub fn register_hook(&self, ds: &str, collection: Option<&str>, hook: Hook) -> Hook {
        let id = hook
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let hook = hook.placed(id.clone(), ds, collection);

        let mut indexes = self.inner.write();
        if indexes.remove(&id).is_some() {
            debug!(hook_id = %id, "replacing existing hook");
        }
        indexes
            .nested(hook.kind())
            .entry(ds.to_string())
            .or_default()
            .entry(collection.map(str::to_string))
            .or_default()
            .insert(id.clone(), hook.clone());
        indexes.by_id.insert(id.clone(), hook.clone());

        info!(hook_id = %id, ds, collection, kind = %hook.kind(), "registered hook");
        hook
    }

    /// Removes a hook from every index.
    pub fn unregister_hook(&self, id: &str) -> Option<Hook> {
        let removed = self.inner.write().remove(id);
        if removed.is_some() {
            info!(hook_id = %id, "unregistered hook");
        }
        removed
    }

    /// Removes every hook targeting `ds`, returning them.
    pub fn remove_datastore(&self, ds: &str) -> Vec<Hook> {
        let mut indexes = self.inner.write();
        let ids: Vec<String> = indexes
            .by_id
            .values()
            .filter(|h| h.ds() == Some(ds))
            .filter_map(|h| h.id().map(str::to_string))
            .collect();
        ids.iter().filter_map(|id| indexes.remove(id)).collect()
    }

    /// Returns the hook registered under `id`.
    pub fn get(&self, id: &str) -> Option<Hook> {
        self.inner.read().by_id.get(id).cloned()
    }

    /// Event hooks matching `ds` and `collection`.
    ///
    /// Hooks registered without a collection match every collection. With
    /// `collection = None` every event hook on the datastore matches.
    pub fn get_event_hooks(&self, ds: &str, collection: Option<&str>) -> Vec<Hook> {
        self.inner.read().matching(HookKind::Event, ds, collection)
    }

    /// Transaction hooks matching `ds` and `collection`, with the same
    /// wildcard rules as [`get_event_hooks`](Self::get_event_hooks).
    pub fn get_transaction_hooks(&self, ds: &str, collection: Option<&str>) -> Vec<Hook> {
        self.inner
            .read()
            .matching(HookKind::Transaction, ds, collection)
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Returns true if no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }
}
