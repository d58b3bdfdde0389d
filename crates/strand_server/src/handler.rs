//! Request handling.

use crate::dispatch::HookDispatcher;
use crate::error::{ServerError, ServerResult};
use crate::executor::{Mutation, StorageExecutor, TransactionFactory};
use crate::memory::MemoryStorage;
use crate::state::CoordinationState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use strand_core::{
    CoreError, EventType, Hook, HookEnvelope, HookKind, PermitGuard, PermitKey,
    SharedTransactable, TrackedTransaction, Transactable,
};
use strand_protocol::{
    DecodeError, DropDatastoreRequest, MutateRequest, Packet, QueryRequest, RegisterHookRequest,
    Response, TruncateRequest, TxRequest, UnregisterHookRequest, PRIMARY_KEY_FIELD,
};
use tracing::{debug, info, warn};

/// A transaction a session has soft-executed and not yet finished.
struct OpenTransaction {
    transaction: SharedTransactable,
    mutation: Mutation,
    _permits: Vec<PermitGuard>,
}

/// Per-connection request state.
///
/// A session owns the transactions it opened together with their record
/// permits. Dropping an open transaction releases its permits.
pub struct Session {
    peer: String,
    open: HashMap<String, OpenTransaction>,
}

impl Session {
    /// Creates a session for a peer.
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            open: HashMap::new(),
        }
    }

    /// Peer label used in logs.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Ids of transactions opened by this session, sorted.
    pub fn open_transactions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.open.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Turns request packets into reply packets.
///
/// Every request gets exactly one reply: a `Response` on success or an
/// `Error` carrying [`ServerError::code`].
pub struct RequestHandler {
    state: CoordinationState,
    storage: Arc<dyn StorageExecutor>,
    factory: Arc<dyn TransactionFactory>,
    dispatcher: HookDispatcher,
}

impl RequestHandler {
    /// Creates a handler over shared state and storage collaborators.
    pub fn new(
        state: CoordinationState,
        storage: Arc<dyn StorageExecutor>,
        factory: Arc<dyn TransactionFactory>,
        dispatcher: HookDispatcher,
    ) -> Self {
        Self {
            state,
            storage,
            factory,
            dispatcher,
        }
    }

    /// Creates a handler backed by [`MemoryStorage`].
    pub fn in_memory(storage: MemoryStorage, dispatcher: HookDispatcher) -> Self {
        Self::new(
            CoordinationState::new(),
            Arc::new(storage.clone()),
            Arc::new(storage),
            dispatcher,
        )
    }

    /// Shared coordination state.
    pub fn state(&self) -> &CoordinationState {
        &self.state
    }

    /// Handles one decoded packet and returns the reply.
    pub fn handle(&self, session: &mut Session, packet: Packet) -> Packet {
        let request_id = packet.request_id();
        let packet_type = packet.packet_type();
        debug!(peer = %session.peer, request_id, ?packet_type, "handling request");

        match self.route(session, packet) {
            Ok(payload) => Packet::Response(Response::new(request_id, payload)),
            Err(err) => {
                if err.is_server_error() {
                    warn!(peer = %session.peer, request_id, error = %err, "request failed");
                } else {
                    debug!(peer = %session.peer, request_id, error = %err, "request rejected");
                }
                Packet::Error(err.to_response(request_id))
            }
        }
    }

    /// Builds the reply for a frame that could not be decoded.
    ///
    /// The request id is unknown, so the reply carries 0.
    pub fn handle_decode_error(&self, err: &DecodeError) -> Packet {
        debug!(error = %err, fatal = err.is_fatal(), "undecodable frame");
        Packet::Error(ServerError::from(err.clone()).to_response(0))
    }

    /// Rolls back everything a closing session left open.
    pub fn end_session(&self, session: Session) {
        let peer = session.peer;
        for (tx_id, open) in session.open {
            if !open.transaction.rollback() {
                warn!(%peer, tx_id = %tx_id, "rollback of abandoned transaction failed");
            }
            self.state.transactions.unregister_if(&tx_id, &open.transaction);
            info!(%peer, tx_id = %tx_id, "rolled back abandoned transaction");
        }
    }

    fn route(&self, session: &mut Session, packet: Packet) -> ServerResult<Value> {
        match packet {
            Packet::Query(request) => self.query(request),
            Packet::Mutate(request) => self.mutate(session, request),
            Packet::Commit(request) => self.commit(session, request),
            Packet::Rollback(request) => self.rollback(session, request),
            Packet::Truncate(request) => self.truncate(request),
            Packet::DropDatastore(request) => self.drop_datastore(request),
            Packet::RegisterHook(request) => self.register_hook(request),
            Packet::UnregisterHook(request) => self.unregister_hook(request),
            other @ (Packet::Response(_) | Packet::Error(_)) => Err(ServerError::InvalidRequest(
                format!("{:?} packets are not requests", other.packet_type()),
            )),
        }
    }

    fn query(&self, request: QueryRequest) -> ServerResult<Value> {
        self.storage
            .execute_query(&request.ds, &request.query)
            .map_err(ServerError::Storage)
    }

    fn mutate(&self, session: &mut Session, request: MutateRequest) -> ServerResult<Value> {
        let tx_id = request.tx_id.clone();
        if tx_id.is_empty() {
            return Err(ServerError::InvalidRequest("empty transaction id".into()));
        }
        if request.records.is_empty() {
            return Err(ServerError::InvalidRequest("mutation without records".into()));
        }

        let mutation = Mutation::from(request);
        let pks = mutation.primary_keys().ok_or_else(|| {
            ServerError::InvalidRequest(format!("every record needs a {PRIMARY_KEY_FIELD}"))
        })?;

        for coarse in [
            PermitKey::datastore(&mutation.ds),
            PermitKey::collection(&mutation.ds, &mutation.collection),
        ] {
            if self.state.permits.is_held(&coarse) {
                return Err(ServerError::busy(coarse));
            }
        }

        let keys: Vec<PermitKey> = pks
            .iter()
            .map(|pk| PermitKey::record(&mutation.ds, &mutation.collection, pk))
            .collect();
        let permits = self
            .state
            .permits
            .try_acquire_all(keys.iter().cloned())
            .ok_or_else(|| self.busy(&keys))?;

        let inner = self.factory.create(&mutation).map_err(ServerError::Storage)?;
        let transaction: SharedTransactable = Arc::new(TrackedTransaction::new(inner));
        if !self
            .state
            .transactions
            .try_register(tx_id.clone(), Arc::clone(&transaction))
        {
            return Err(ServerError::TransactionActive(tx_id));
        }
        if !transaction.soft_execute() {
            self.state.transactions.unregister_if(&tx_id, &transaction);
            return Err(ServerError::TransactionFailed {
                tx_id,
                stage: "soft-execute",
            });
        }

        info!(
            peer = %session.peer,
            tx_id = %tx_id,
            ds = %mutation.ds,
            collection = %mutation.collection,
            records = pks.len(),
            "transaction soft-executed"
        );

        session.open.insert(
            tx_id.clone(),
            OpenTransaction {
                transaction,
                mutation,
                _permits: permits,
            },
        );
        Ok(json!({ "tx_id": tx_id, "state": "soft-executed", "records": pks.len() }))
    }

    fn commit(&self, session: &mut Session, request: TxRequest) -> ServerResult<Value> {
        let OpenTransaction {
            transaction,
            mutation,
            _permits: permits,
        } = self.take_open(session, &request.tx_id)?;

        if !transaction.commit() {
            transaction.rollback();
            self.state
                .transactions
                .unregister_if(&request.tx_id, &transaction);
            return Err(ServerError::TransactionFailed {
                tx_id: request.tx_id,
                stage: "commit",
            });
        }
        self.state
            .transactions
            .unregister_if(&request.tx_id, &transaction);
        drop(permits);
        info!(peer = %session.peer, tx_id = %request.tx_id, "transaction committed");

        let notified = self.notify_commit(mutation);
        Ok(json!({ "tx_id": request.tx_id, "state": "committed", "hooks": notified }))
    }

    fn rollback(&self, session: &mut Session, request: TxRequest) -> ServerResult<Value> {
        let open = self.take_open(session, &request.tx_id)?;

        let rolled_back = open.transaction.rollback();
        self.state
            .transactions
            .unregister_if(&request.tx_id, &open.transaction);
        drop(open);

        if !rolled_back {
            warn!(tx_id = %request.tx_id, "rollback reported failure");
            return Err(ServerError::TransactionFailed {
                tx_id: request.tx_id,
                stage: "roll back",
            });
        }
        info!(peer = %session.peer, tx_id = %request.tx_id, "transaction rolled back");
        Ok(json!({ "tx_id": request.tx_id, "state": "rolled-back" }))
    }

    fn truncate(&self, request: TruncateRequest) -> ServerResult<Value> {
        let TruncateRequest { ds, collection, .. } = request;
        let ds_key = PermitKey::datastore(&ds);
        if self.state.permits.is_held(&ds_key) {
            return Err(ServerError::busy(ds_key));
        }
        let key = PermitKey::collection(&ds, &collection);
        let _permit = self
            .state
            .permits
            .try_acquire_guard(key.clone())
            .ok_or_else(|| ServerError::busy(&key))?;

        let removed = self
            .storage
            .truncate_collection(&ds, &collection)
            .map_err(ServerError::Storage)?;
        info!(ds = %ds, collection = %collection, removed, "collection truncated");

        let hooks = self.state.hooks.get_event_hooks(&ds, Some(&collection));
        let envelope = HookEnvelope::package(
            HookKind::Event,
            EventType::Truncate,
            ds.clone(),
            Some(&collection),
            Vec::<Value>::new(),
        );
        let notified = self.dispatcher.dispatch(&hooks, &envelope);
        Ok(json!({ "ds": ds, "c": collection, "removed": removed, "hooks": notified }))
    }

    fn drop_datastore(&self, request: DropDatastoreRequest) -> ServerResult<Value> {
        let ds = request.ds;
        let key = PermitKey::datastore(&ds);
        let _permit = self
            .state
            .permits
            .try_acquire_guard(key.clone())
            .ok_or_else(|| ServerError::busy(&key))?;

        let existed = self
            .storage
            .drop_datastore(&ds)
            .map_err(ServerError::Storage)?;

        let hooks = self.state.hooks.get_event_hooks(&ds, None);
        let envelope = HookEnvelope::package(
            HookKind::Event,
            EventType::Drop,
            ds.clone(),
            None,
            Vec::<Value>::new(),
        );
        let notified = self.dispatcher.dispatch(&hooks, &envelope);
        let hooks_removed = self.state.hooks.remove_datastore(&ds).len();
        info!(ds = %ds, existed, hooks_removed, "datastore dropped");

        Ok(json!({
            "ds": ds,
            "existed": existed,
            "hooks": notified,
            "hooks_removed": hooks_removed
        }))
    }

    fn register_hook(&self, request: RegisterHookRequest) -> ServerResult<Value> {
        let hook = Hook::from_json(&request.hook)?;
        let stored = self.state.hooks.register(hook)?;
        Ok(stored.to_json()?)
    }

    fn unregister_hook(&self, request: UnregisterHookRequest) -> ServerResult<Value> {
        let removed = self
            .state
            .hooks
            .unregister_hook(&request.hook_id)
            .ok_or_else(|| CoreError::hook_not_found(request.hook_id.as_str()))?;
        Ok(removed.to_json()?)
    }

    /// Removes `tx_id` from the session that opened it.
    fn take_open(&self, session: &mut Session, tx_id: &str) -> ServerResult<OpenTransaction> {
        match session.open.remove(tx_id) {
            Some(open) => Ok(open),
            None if self.state.transactions.contains(tx_id) => {
                Err(ServerError::busy(format!("transaction:{tx_id}")))
            }
            None => Err(CoreError::unknown_transaction(tx_id).into()),
        }
    }

    fn notify_commit(&self, mutation: Mutation) -> usize {
        let mut hooks = self
            .state
            .hooks
            .get_transaction_hooks(&mutation.ds, Some(&mutation.collection));
        hooks.extend(
            self.state
                .hooks
                .get_event_hooks(&mutation.ds, Some(&mutation.collection)),
        );
        if hooks.is_empty() {
            return 0;
        }

        let envelope = HookEnvelope::package(
            HookKind::Transaction,
            mutation.event_type(),
            mutation.ds.clone(),
            Some(&mutation.collection),
            mutation.records,
        );
        self.dispatcher.dispatch(&hooks, &envelope)
    }

    fn busy(&self, keys: &[PermitKey]) -> ServerError {
        let held = keys
            .iter()
            .find(|key| self.state.permits.is_held(key))
            .or(keys.first());
        ServerError::busy(held.map(ToString::to_string).unwrap_or_default())
    }
}
