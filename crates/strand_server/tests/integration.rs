//! Integration tests for the Strand node.

use proptest::prelude::*;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use strand_core::{
    PermitKey, PermitScope, PermitStore, SharedTransactable, TrackedTransaction, Transactable,
    TransactionRegistry,
};
use strand_protocol::{
    DecodeError, FrameDecoder, MutateRequest, MutationKind, Packet, RegisterHookRequest,
    TxRequest,
};
use strand_server::{
    serve_connection, HookDispatcher, MemoryStorage, RequestHandler, ServerConfig, StrandServer,
};
use strand_testkit::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn reply_payload(reply: Packet) -> serde_json::Value {
    match reply {
        Packet::Response(response) => response.payload,
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn valid_frame_then_unknown_type_yields_packet_then_error() {
    let commit = Packet::Commit(TxRequest::new(1, "tx-1"));
    let bytes = stream_of(&[frame(&commit), raw_frame(200, b"\xa0")]);

    let output = FrameDecoder::new().decode_all(&bytes);
    assert_eq!(
        output,
        vec![Ok(commit), Err(DecodeError::UnknownPacketType(200))]
    );
}

#[test]
fn permit_and_transaction_lifecycle() {
    let permits = PermitStore::new();
    let transactions = TransactionRegistry::new();
    let key = PermitKey::record("sales", "orders", "pk-42");

    assert!(permits.acquire(&key));

    let update: SharedTransactable =
        Arc::new(TrackedTransaction::new(ScriptedTransactable::succeeding()));
    transactions.register("tx-1", Arc::clone(&update));
    assert!(transactions.get("tx-1").unwrap().soft_execute());

    assert!(transactions.require("tx-1").unwrap().commit());
    transactions.unregister("tx-1");
    permits.release(&key);

    assert!(transactions.get("tx-1").is_none());
    assert!(permits.acquire(&key));
}

fn insert(request_id: u64, tx_id: &str, pk: &str) -> Packet {
    Packet::Mutate(MutateRequest::new(
        request_id,
        tx_id,
        "sales",
        "orders",
        MutationKind::Insert,
        vec![record(pk, json!({}))],
    ))
}

#[test]
fn failed_commit_is_reported_and_cleaned_up() {
    let node = TestNode::with_factory(ScriptedFactory::new(ScriptedTransactable::failing_commit));
    let mut session = node.session("writer");
    for (id, collection, kind) in [
        ("t", Some("orders"), "transaction-hook"),
        ("e", None, "event-hook"),
    ] {
        reply_payload(node.send(
            &mut session,
            Packet::RegisterHook(RegisterHookRequest::new(
                1,
                hook_payload(id, "sales", collection, kind, &format!("http://{id}")),
            )),
        ));
    }

    reply_payload(node.send(&mut session, insert(2, "tx-1", "pk-42")));
    match node.send(&mut session, Packet::Commit(TxRequest::new(3, "tx-1"))) {
        Packet::Error(error) => {
            assert_eq!(error.request_id, 3);
            assert_eq!(error.code, 409);
            assert!(error.message.contains("commit"));
        }
        reply => panic!("expected failure, got {reply:?}"),
    }

    let state = node.handler.state();
    assert!(!state.transactions.contains("tx-1"));
    assert!(!state
        .permits
        .is_held(&PermitKey::record("sales", "orders", "pk-42")));
    assert!(session.open_transactions().is_empty());
    assert!(node.hooks.is_empty());
}

#[test]
fn failed_soft_execute_leaves_nothing_behind() {
    let factory = ScriptedFactory::new(ScriptedTransactable::failing_soft_execute);
    let node = TestNode::with_factory(factory);
    let mut session = node.session("writer");

    match node.send(&mut session, insert(1, "tx-1", "pk-42")) {
        Packet::Error(error) => assert_eq!(error.code, 409),
        reply => panic!("expected failure, got {reply:?}"),
    }

    let state = node.handler.state();
    assert!(state.transactions.is_empty());
    assert_eq!(state.permits.held_count(PermitScope::Record), 0);
    assert!(session.open_transactions().is_empty());
}

#[test]
fn racing_sessions_cannot_share_a_transaction_id() {
    let node = TestNode::new();

    for round in 0..200 {
        let tx_id = format!("tx-{round}");
        let barrier = Barrier::new(2);

        let outcomes: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = ["a", "b"]
                .into_iter()
                .map(|peer| {
                    let (node, barrier, tx_id) = (&node, &barrier, tx_id.as_str());
                    scope.spawn(move || {
                        let pk = format!("{peer}-{round}");
                        let mut session = node.session(peer);
                        barrier.wait();
                        let reply = node.send(&mut session, insert(1, tx_id, &pk));
                        (pk, session, reply)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        let mut winners = 0;
        for (pk, mut session, reply) in outcomes {
            match reply {
                Packet::Response(_) => {
                    winners += 1;
                    let commit = node.send(&mut session, Packet::Commit(TxRequest::new(2, &tx_id)));
                    assert!(matches!(commit, Packet::Response(_)), "{commit:?}");
                    assert!(node.storage.record("sales", "orders", &pk).is_some());
                }
                Packet::Error(error) => {
                    assert_eq!(error.code, 409);
                    assert!(node.storage.record("sales", "orders", &pk).is_none());
                }
                other => panic!("unexpected reply {other:?}"),
            }
            node.handler.end_session(session);
        }
        assert_eq!(winners, 1, "round {round}");
    }

    assert!(node.handler.state().transactions.is_empty());
    assert_eq!(node.handler.state().permits.held_count(PermitScope::Record), 0);
}

#[test]
fn update_flow_through_the_handler() {
    let node = TestNode::new();
    let mut writer = node.session("writer");
    let mut other = node.session("other");

    node.send(
        &mut writer,
        Packet::RegisterHook(RegisterHookRequest::new(
            1,
            hook_payload("audit", "sales", Some("orders"), "transaction-hook", "http://audit"),
        )),
    );
    node.send(
        &mut writer,
        Packet::Mutate(MutateRequest::new(
            2,
            "tx-0",
            "sales",
            "orders",
            MutationKind::Insert,
            vec![record("pk-42", json!({"qty": 1}))],
        )),
    );
    node.send(&mut writer, Packet::Commit(TxRequest::new(3, "tx-0")));

    let update = Packet::Mutate(MutateRequest::new(
        4,
        "tx-1",
        "sales",
        "orders",
        MutationKind::Update,
        vec![record("pk-42", json!({"qty": 5}))],
    ));
    reply_payload(node.send(&mut writer, update));

    // A concurrent writer is turned away while the permit is held.
    let contender = Packet::Mutate(MutateRequest::new(
        1,
        "tx-9",
        "sales",
        "orders",
        MutationKind::Delete,
        vec![record("pk-42", json!({}))],
    ));
    match node.send(&mut other, contender.clone()) {
        Packet::Error(error) => assert_eq!(error.code, 409),
        reply => panic!("expected busy, got {reply:?}"),
    }

    reply_payload(node.send(&mut writer, Packet::Commit(TxRequest::new(5, "tx-1"))));
    assert_eq!(node.storage.record("sales", "orders", "pk-42").unwrap()["qty"], 5);

    let bodies = node.hooks.bodies_for("http://audit");
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[1]["type"], "transaction-hook");
    assert_eq!(bodies[1]["event"], "update");
    assert_eq!(bodies[1]["payload"], json!([{"_id": "pk-42", "qty": 5}]));

    // Released: the other session gets through now.
    reply_payload(node.send(&mut other, contender));
}

#[tokio::test]
async fn delivery_retries_on_runtime() {
    let transport = Arc::new(FlakyTransport::failing(2));
    let handler = RequestHandler::in_memory(
        MemoryStorage::new(),
        HookDispatcher::new(transport.clone(), fast_delivery(5)),
    );
    let mut session = strand_server::Session::new("test");

    handler.handle(
        &mut session,
        Packet::RegisterHook(RegisterHookRequest::new(
            1,
            hook_payload("h", "sales", None, "event-hook", "http://listener"),
        )),
    );
    handler.handle(
        &mut session,
        Packet::Mutate(MutateRequest::new(
            2,
            "tx-1",
            "sales",
            "orders",
            MutationKind::Insert,
            vec![record("a", json!({}))],
        )),
    );
    handler.handle(&mut session, Packet::Commit(TxRequest::new(3, "tx-1")));

    assert!(
        transport
            .delivered
            .wait_for(1, Duration::from_secs(5))
            .await
    );
    assert_eq!(transport.attempts(), 3);
    assert_eq!(transport.delivered.posts()[0].0, "http://listener");
}

#[tokio::test]
async fn duplex_session_end_to_end() {
    let node = TestNode::new();
    let (mut client, server) = tokio::io::duplex(4096);

    let requests = stream_of(&[
        frame(&Packet::Mutate(MutateRequest::new(
            1,
            "tx-1",
            "sales",
            "orders",
            MutationKind::Insert,
            vec![record("pk-42", json!({}))],
        ))),
        frame(&Packet::Commit(TxRequest::new(2, "tx-1"))),
        frame(&Packet::Commit(TxRequest::new(3, "tx-1"))),
    ]);

    let handler = Arc::clone(&node.handler);
    let client_side = async move {
        client.write_all(&requests).await.unwrap();
        client.shutdown().await.unwrap();
        let mut bytes = Vec::new();
        client.read_to_end(&mut bytes).await.unwrap();
        bytes
    };
    let (bytes, served) = tokio::join!(
        client_side,
        serve_connection(server, &handler, "duplex", 4096)
    );
    served.unwrap();

    let replies: Vec<Packet> = FrameDecoder::new()
        .decode_all(&bytes)
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(replies.len(), 3);
    assert!(matches!(&replies[0], Packet::Response(r) if r.request_id == 1));
    assert!(matches!(&replies[1], Packet::Response(r) if r.request_id == 2));
    assert!(matches!(&replies[2], Packet::Error(e) if e.request_id == 3 && e.code == 404));
    assert!(node.storage.record("sales", "orders", "pk-42").is_some());
}

#[tokio::test]
async fn tcp_clients_share_state() {
    let node = TestNode::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = StrandServer::new(
        ServerConfig::new(addr),
        RequestHandler::in_memory(node.storage.clone(), HookDispatcher::logging(fast_delivery(1))),
    );
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

    let clients = async move {
        let mut first = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut second = tokio::net::TcpStream::connect(addr).await.unwrap();

        let hold = frame(&Packet::Mutate(MutateRequest::new(
            1,
            "tx-a",
            "sales",
            "orders",
            MutationKind::Insert,
            vec![record("shared", json!({}))],
        )));
        first.write_all(&hold).await.unwrap();
        let reply = read_one(&mut first).await;
        assert!(matches!(reply, Packet::Response(_)));

        let clash = frame(&Packet::Mutate(MutateRequest::new(
            1,
            "tx-b",
            "sales",
            "orders",
            MutationKind::Insert,
            vec![record("shared", json!({}))],
        )));
        second.write_all(&clash).await.unwrap();
        let reply = read_one(&mut second).await;
        assert!(matches!(reply, Packet::Error(e) if e.code == 409));

        stop.send(()).unwrap();
    };

    let (_, served) = tokio::join!(
        clients,
        server.serve(listener, async move {
            let _ = stopped.await;
        })
    );
    served.unwrap();
}

async fn read_one(stream: &mut tokio::net::TcpStream) -> Packet {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 512];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before a reply");
        decoder.feed(&buf[..n]);
        if let Some(item) = decoder.decode_next() {
            return item.unwrap();
        }
    }
}

fn stream_with_junk(packets: &[Packet], junk_type: u8) -> Vec<u8> {
    let mut frames: Vec<Vec<u8>> = packets.iter().map(frame).collect();
    frames.insert(frames.len() / 2, raw_frame(junk_type, b"\xa0"));
    stream_of(&frames)
}

proptest! {
    #[test]
    fn chunking_does_not_change_decoding(
        (frames, bytes, cuts) in (prop::collection::vec(request_packet_strategy(), 1..6), 9u8..64)
            .prop_map(|(packets, junk_type)| (packets.len() + 1, stream_with_junk(&packets, junk_type)))
            .prop_flat_map(|(frames, bytes)| {
                let len = bytes.len();
                (Just(frames), Just(bytes), split_points_strategy(len))
            }),
    ) {
        let whole = FrameDecoder::new().decode_all(&bytes);
        prop_assert_eq!(whole.len(), frames);

        let mut decoder = FrameDecoder::new();
        let mut chunked = Vec::new();
        for chunk in split_at_points(&bytes, &cuts) {
            chunked.extend(decoder.decode_all(chunk));
        }
        prop_assert_eq!(chunked, whole);
    }
}
