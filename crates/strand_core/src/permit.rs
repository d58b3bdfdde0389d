//! Permit store.
//!
//! Permits are advisory exclusive claims on resource names at three
//! granularities. Each scope is an independent key space: a record permit
//! never blocks a datastore permit and vice versa. Composing scope checks
//! is up to the calling operation.
//!
//! The store answers one question, "is this key held". It does not track
//! owners, so callers must release exactly the permits they acquired.
//! [`PermitGuard`] does that on drop.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Granularity of a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermitScope {
    /// A whole datastore (drop, truncate-all).
    Datastore,
    /// A collection within a datastore (schema changes, truncate).
    Collection,
    /// A single record (insert, update, delete).
    Record,
}

impl PermitScope {
    /// Lowercase name used in logs and replies.
    pub fn as_str(self) -> &'static str {
        match self {
            PermitScope::Datastore => "datastore",
            PermitScope::Collection => "collection",
            PermitScope::Record => "record",
        }
    }
}

/// A scoped, fully-qualified resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermitKey {
    scope: PermitScope,
    key: String,
}

impl PermitKey {
    /// Key for a record: `ds.collection.pk`.
    pub fn record(ds: &str, collection: &str, pk: &str) -> Self {
        Self {
            scope: PermitScope::Record,
            key: format!("{ds}.{collection}.{pk}"),
        }
    }

    /// Key for a collection: `ds.collection`.
    pub fn collection(ds: &str, collection: &str) -> Self {
        Self {
            scope: PermitScope::Collection,
            key: format!("{ds}.{collection}"),
        }
    }

    /// Key for a datastore: the datastore name verbatim.
    pub fn datastore(ds: &str) -> Self {
        Self {
            scope: PermitScope::Datastore,
            key: ds.to_string(),
        }
    }

    /// Returns the scope.
    pub fn scope(&self) -> PermitScope {
        self.scope
    }

    /// Returns the key string within its scope.
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for PermitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope.as_str(), self.key)
    }
}

/// In-memory permit registry with one key set per scope.
///
/// All operations are non-blocking in the sense that matters here: they
/// never wait for a permit to free up. A denied [`acquire`](Self::acquire)
/// should be answered with a busy reply, not retried in a loop.
#[derive(Debug, Default)]
pub struct PermitStore {
    datastores: Mutex<HashSet<String>>,
    collections: Mutex<HashSet<String>>,
    records: Mutex<HashSet<String>>,
}

impl PermitStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self, scope: PermitScope) -> &Mutex<HashSet<String>> {
        match scope {
            PermitScope::Datastore => &self.datastores,
            PermitScope::Collection => &self.collections,
            PermitScope::Record => &self.records,
        }
    }

    /// Atomically claims `key` if nobody holds it.
    ///
    /// Returns true when the permit was granted.
    pub fn acquire(&self, key: &PermitKey) -> bool {
        let granted = self.keys(key.scope).lock().insert(key.key.clone());
        if !granted {
            debug!(permit = %key, "permit denied");
        }
        granted
    }

    /// Releases `key`. Releasing a key nobody holds is a no-op.
    pub fn release(&self, key: &PermitKey) {
        self.keys(key.scope).lock().remove(&key.key);
    }

    /// Point-in-time check; the answer may be stale on return.
    pub fn is_held(&self, key: &PermitKey) -> bool {
        self.keys(key.scope).lock().contains(&key.key)
    }

    /// Number of permits currently held in a scope.
    pub fn held_count(&self, scope: PermitScope) -> usize {
        self.keys(scope).lock().len()
    }

    /// Claims `key` and returns a guard that releases it on drop.
    pub fn try_acquire_guard(self: &Arc<Self>, key: PermitKey) -> Option<PermitGuard> {
        if self.acquire(&key) {
            Some(PermitGuard {
                store: Arc::clone(self),
                key,
            })
        } else {
            None
        }
    }

    /// Claims every key or none of them.
    ///
    /// Duplicate keys are claimed once. If any key is already held, the
    /// permits taken so far are released and `None` is returned.
    pub fn try_acquire_all(
        self: &Arc<Self>,
        keys: impl IntoIterator<Item = PermitKey>,
    ) -> Option<Vec<PermitGuard>> {
        let mut seen = HashSet::new();
        let mut guards = Vec::new();
        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            // Dropping `guards` on the early return releases what we took.
            guards.push(self.try_acquire_guard(key)?);
        }
        Some(guards)
    }
}

/// A held permit, released when dropped.
#[derive(Debug)]
pub struct PermitGuard {
    store: Arc<PermitStore>,
    key: PermitKey,
}

impl PermitGuard {
    /// Returns the held key.
    pub fn key(&self) -> &PermitKey {
        &self.key
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        self.store.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn key_construction() {
        assert_eq!(
            PermitKey::record("sales", "orders", "pk-42").as_str(),
            "sales.orders.pk-42"
        );
        assert_eq!(PermitKey::collection("sales", "orders").as_str(), "sales.orders");
        assert_eq!(PermitKey::datastore("sales").as_str(), "sales");
        assert_eq!(
            PermitKey::collection("sales", "orders").to_string(),
            "collection:sales.orders"
        );
    }

    #[test]
    fn acquire_is_exclusive_until_release() {
        let store = PermitStore::new();
        for key in [
            PermitKey::datastore("ds"),
            PermitKey::collection("ds", "c"),
            PermitKey::record("ds", "c", "1"),
        ] {
            assert!(store.acquire(&key));
            assert!(!store.acquire(&key));
            assert!(store.is_held(&key));

            store.release(&key);
            assert!(!store.is_held(&key));
            assert!(store.acquire(&key));
        }
    }

    #[test]
    fn release_of_unheld_key_is_noop() {
        let store = PermitStore::new();
        store.release(&PermitKey::record("a", "b", "c"));
        assert_eq!(store.held_count(PermitScope::Record), 0);
    }

    #[test]
    fn scopes_do_not_collide() {
        let store = PermitStore::new();

        // Same literal string in two scopes.
        assert!(store.acquire(&PermitKey::datastore("x.y")));
        assert!(store.acquire(&PermitKey::collection("x", "y")));

        // Holding a record does not block coarser scopes.
        assert!(store.acquire(&PermitKey::record("x", "y", "1")));
        assert!(store.acquire(&PermitKey::datastore("x")));

        assert_eq!(store.held_count(PermitScope::Datastore), 2);
        assert_eq!(store.held_count(PermitScope::Collection), 1);
        assert_eq!(store.held_count(PermitScope::Record), 1);
    }

    #[test]
    fn guard_releases_on_drop() {
        let store = Arc::new(PermitStore::new());
        let key = PermitKey::record("sales", "orders", "pk-1");

        let guard = store.try_acquire_guard(key.clone()).unwrap();
        assert_eq!(guard.key(), &key);
        assert!(store.try_acquire_guard(key.clone()).is_none());

        drop(guard);
        assert!(!store.is_held(&key));
    }

    #[test]
    fn acquire_all_is_all_or_nothing() {
        let store = Arc::new(PermitStore::new());
        let busy = PermitKey::record("ds", "c", "2");
        assert!(store.acquire(&busy));

        let keys = vec![
            PermitKey::record("ds", "c", "1"),
            busy.clone(),
            PermitKey::record("ds", "c", "3"),
        ];
        assert!(store.try_acquire_all(keys).is_none());
        assert!(!store.is_held(&PermitKey::record("ds", "c", "1")));
        assert_eq!(store.held_count(PermitScope::Record), 1);

        store.release(&busy);
        let guards = store
            .try_acquire_all(vec![
                PermitKey::record("ds", "c", "1"),
                PermitKey::record("ds", "c", "1"),
                busy,
            ])
            .unwrap();
        assert_eq!(guards.len(), 2);
        assert_eq!(store.held_count(PermitScope::Record), 2);

        drop(guards);
        assert_eq!(store.held_count(PermitScope::Record), 0);
    }

    #[test]
    fn concurrent_acquire_has_single_winner() {
        let store = Arc::new(PermitStore::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let store = Arc::clone(&store);
                let winners = Arc::clone(&winners);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    if store.acquire(&PermitKey::record("ds", "c", "hot")) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
