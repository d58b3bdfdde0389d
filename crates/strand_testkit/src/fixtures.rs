//! Test fixtures.
//!
//! Scripted transactables, recording hook transports, a ready-made node
//! and raw frame builders.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use strand_core::Transactable;
use strand_protocol::{encode_frame, Packet, HEADER_SIZE, MAGIC, PROTOCOL_VERSION};
use strand_server::{
    CoordinationState, DeliveryConfig, HookDispatcher, HookTransport, MemoryStorage, Mutation,
    RequestHandler, Session, TransactionFactory,
};

/// A transactable with fixed outcomes that records every call.
#[derive(Debug)]
pub struct ScriptedTransactable {
    soft_execute_ok: bool,
    commit_ok: bool,
    rollback_ok: bool,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedTransactable {
    /// Every step succeeds.
    pub fn succeeding() -> Self {
        Self::new(true, true, true)
    }

    /// Soft-execute reports failure.
    pub fn failing_soft_execute() -> Self {
        Self::new(false, true, true)
    }

    /// Commit reports failure.
    pub fn failing_commit() -> Self {
        Self::new(true, false, true)
    }

    fn new(soft_execute_ok: bool, commit_ok: bool, rollback_ok: bool) -> Self {
        Self {
            soft_execute_ok,
            commit_ok,
            rollback_ok,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

impl Transactable for ScriptedTransactable {
    fn soft_execute(&self) -> bool {
        self.calls.lock().push("soft_execute");
        self.soft_execute_ok
    }

    fn commit(&self) -> bool {
        self.calls.lock().push("commit");
        self.commit_ok
    }

    fn rollback(&self) -> bool {
        self.calls.lock().push("rollback");
        self.rollback_ok
    }
}

/// A transaction factory that hands out scripted transactables.
#[derive(Debug)]
pub struct ScriptedFactory {
    make: fn() -> ScriptedTransactable,
    created: Mutex<usize>,
}

impl ScriptedFactory {
    /// Builds every transaction with `make`.
    pub fn new(make: fn() -> ScriptedTransactable) -> Self {
        Self {
            make,
            created: Mutex::new(0),
        }
    }

    /// Number of transactions created so far.
    pub fn created(&self) -> usize {
        *self.created.lock()
    }
}

impl TransactionFactory for ScriptedFactory {
    fn create(&self, _mutation: &Mutation) -> Result<Box<dyn Transactable>, String> {
        *self.created.lock() += 1;
        Ok(Box::new((self.make)()))
    }
}

/// A hook transport that keeps every delivered body.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    posts: Mutex<Vec<(String, Value)>>,
}

impl RecordingTransport {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered `(url, body)` pairs, in delivery order.
    pub fn posts(&self) -> Vec<(String, Value)> {
        self.posts.lock().clone()
    }

    /// Bodies delivered to `url`.
    pub fn bodies_for(&self, url: &str) -> Vec<Value> {
        self.posts
            .lock()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Number of deliveries.
    pub fn len(&self) -> usize {
        self.posts.lock().len()
    }

    /// Returns true if nothing was delivered.
    pub fn is_empty(&self) -> bool {
        self.posts.lock().is_empty()
    }

    /// Waits until at least `count` deliveries arrived.
    ///
    /// Returns false on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.len() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

impl HookTransport for RecordingTransport {
    fn post(&self, url: &str, body: &[u8]) -> Result<(), String> {
        let body = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        self.posts.lock().push((url.to_string(), body));
        Ok(())
    }
}

/// A transport that fails a fixed number of times before recording.
#[derive(Debug, Default)]
pub struct FlakyTransport {
    failures_left: Mutex<u32>,
    attempts: Mutex<u32>,
    /// Successful deliveries.
    pub delivered: RecordingTransport,
}

impl FlakyTransport {
    /// Fails the first `failures` attempts.
    pub fn failing(failures: u32) -> Self {
        Self {
            failures_left: Mutex::new(failures),
            ..Default::default()
        }
    }

    /// Attempts made so far, failed ones included.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }
}

impl HookTransport for FlakyTransport {
    fn post(&self, url: &str, body: &[u8]) -> Result<(), String> {
        *self.attempts.lock() += 1;
        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err("503 service unavailable".into());
            }
        }
        self.delivered.post(url, body)
    }
}

/// Delivery settings with millisecond backoff, for retry tests.
pub fn fast_delivery(max_attempts: u32) -> DeliveryConfig {
    DeliveryConfig::new(max_attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

/// A node backed by memory storage with recorded hook deliveries.
pub struct TestNode {
    /// The handler under test.
    pub handler: Arc<RequestHandler>,
    /// Storage shared with the handler.
    pub storage: MemoryStorage,
    /// Hook deliveries.
    pub hooks: Arc<RecordingTransport>,
}

impl TestNode {
    /// Creates a node that makes one delivery attempt per hook.
    pub fn new() -> Self {
        let storage = MemoryStorage::new();
        let hooks = Arc::new(RecordingTransport::new());
        let dispatcher = HookDispatcher::new(hooks.clone(), DeliveryConfig::no_retry());
        Self {
            handler: Arc::new(RequestHandler::in_memory(storage.clone(), dispatcher)),
            storage,
            hooks,
        }
    }

    /// Creates a node whose transactions come from `factory`.
    ///
    /// Storage still answers queries, truncates and drops, but mutations
    /// never reach it.
    pub fn with_factory(factory: impl TransactionFactory + 'static) -> Self {
        let storage = MemoryStorage::new();
        let hooks = Arc::new(RecordingTransport::new());
        let dispatcher = HookDispatcher::new(hooks.clone(), DeliveryConfig::no_retry());
        let handler = RequestHandler::new(
            CoordinationState::new(),
            Arc::new(storage.clone()),
            Arc::new(factory),
            dispatcher,
        );
        Self {
            handler: Arc::new(handler),
            storage,
            hooks,
        }
    }

    /// Opens a session.
    pub fn session(&self, peer: &str) -> Session {
        Session::new(peer)
    }

    /// Sends one packet and returns the reply.
    pub fn send(&self, session: &mut Session, packet: Packet) -> Packet {
        self.handler.handle(session, packet)
    }
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}

/// A record with the given primary key and extra fields.
pub fn record(pk: &str, fields: Value) -> Value {
    let mut record = json!({ "_id": pk });
    if let (Some(target), Value::Object(extra)) = (record.as_object_mut(), fields) {
        target.extend(extra);
    }
    record
}

/// Hook subscription payload.
pub fn hook_payload(id: &str, ds: &str, collection: Option<&str>, kind: &str, url: &str) -> Value {
    let mut payload = json!({ "id": id, "ds": ds, "type": kind, "url": url });
    if let Some(c) = collection {
        payload["c"] = json!(c);
    }
    payload
}

/// Encodes a packet as a frame.
pub fn frame(packet: &Packet) -> Vec<u8> {
    encode_frame(packet).expect("packet encodes")
}

/// Builds a frame from a raw type code and body, bypassing the encoder.
pub fn raw_frame(type_code: u8, body: &[u8]) -> Vec<u8> {
    let length = u32::try_from(HEADER_SIZE + body.len()).expect("frame fits in u32");
    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&MAGIC);
    out.push(PROTOCOL_VERSION);
    out.push(type_code);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Concatenates frames into one stream.
pub fn stream_of(frames: &[Vec<u8>]) -> Vec<u8> {
    frames.concat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_protocol::{FrameDecoder, TxRequest};

    #[test]
    fn scripted_outcomes() {
        let tx = ScriptedTransactable::failing_commit();
        assert!(tx.soft_execute());
        assert!(!tx.commit());
        assert!(tx.rollback());
        assert_eq!(tx.calls(), ["soft_execute", "commit", "rollback"]);
    }

    #[test]
    fn scripted_factory_counts() {
        let factory = ScriptedFactory::new(ScriptedTransactable::failing_soft_execute);
        let mutation = Mutation::new(
            "sales",
            "orders",
            strand_protocol::MutationKind::Insert,
            vec![record("a", json!({}))],
        );
        let tx = factory.create(&mutation).unwrap();
        assert!(!tx.soft_execute());
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn flaky_transport_recovers() {
        let transport = FlakyTransport::failing(1);
        assert!(transport.post("http://x", b"{}").is_err());
        assert!(transport.post("http://x", b"{}").is_ok());
        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.delivered.len(), 1);
    }

    #[test]
    fn record_merges_fields() {
        let r = record("pk-42", json!({"qty": 3}));
        assert_eq!(r, json!({"_id": "pk-42", "qty": 3}));
    }

    #[test]
    fn raw_frame_matches_encoder() {
        let packet = Packet::Commit(TxRequest::new(1, "tx-1"));
        let encoded = frame(&packet);
        let rebuilt = raw_frame(encoded[3], &encoded[HEADER_SIZE..]);
        assert_eq!(encoded, rebuilt);

        let decoded = FrameDecoder::new().decode_all(&rebuilt);
        assert_eq!(decoded, vec![Ok(packet)]);
    }
}
