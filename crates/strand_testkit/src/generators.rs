//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::{json, Value};
use strand_protocol::{
    DropDatastoreRequest, MutateRequest, MutationKind, Packet, QueryRequest, TruncateRequest,
    TxRequest, UnregisterHookRequest,
};

/// Strategy for datastore and collection names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for primary keys.
pub fn pk_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9-]{1,12}").expect("Invalid regex")
}

/// Strategy for transaction ids.
pub fn tx_id_strategy() -> impl Strategy<Value = String> {
    (0u32..10_000).prop_map(|n| format!("tx-{n}"))
}

/// Strategy for records with a primary key and a small payload.
pub fn record_strategy() -> impl Strategy<Value = Value> {
    (pk_strategy(), any::<i64>(), ".{0,16}")
        .prop_map(|(pk, qty, note)| json!({ "_id": pk, "qty": qty, "note": note }))
}

/// Strategy for mutation kinds.
pub fn mutation_kind_strategy() -> impl Strategy<Value = MutationKind> {
    prop_oneof![
        Just(MutationKind::Insert),
        Just(MutationKind::Update),
        Just(MutationKind::Delete),
    ]
}

/// Strategy for request packets of every kind except hook registration.
pub fn request_packet_strategy() -> impl Strategy<Value = Packet> {
    prop_oneof![
        (any::<u64>(), name_strategy(), ".{0,32}")
            .prop_map(|(id, ds, q)| Packet::Query(QueryRequest::new(id, ds, q))),
        (
            any::<u64>(),
            tx_id_strategy(),
            name_strategy(),
            name_strategy(),
            mutation_kind_strategy(),
            prop::collection::vec(record_strategy(), 1..4),
        )
            .prop_map(|(id, tx, ds, c, kind, records)| {
                Packet::Mutate(MutateRequest::new(id, tx, ds, c, kind, records))
            }),
        (any::<u64>(), tx_id_strategy())
            .prop_map(|(id, tx)| Packet::Commit(TxRequest::new(id, tx))),
        (any::<u64>(), tx_id_strategy())
            .prop_map(|(id, tx)| Packet::Rollback(TxRequest::new(id, tx))),
        (any::<u64>(), name_strategy(), name_strategy())
            .prop_map(|(id, ds, c)| Packet::Truncate(TruncateRequest::new(id, ds, c))),
        (any::<u64>(), name_strategy())
            .prop_map(|(id, ds)| Packet::DropDatastore(DropDatastoreRequest::new(id, ds))),
        (any::<u64>(), pk_strategy())
            .prop_map(|(id, h)| Packet::UnregisterHook(UnregisterHookRequest::new(id, h))),
    ]
}

/// Strategy for ways of cutting a stream of `len` bytes into chunks.
///
/// Produces sorted, deduplicated cut offsets strictly inside the stream.
pub fn split_points_strategy(len: usize) -> impl Strategy<Value = Vec<usize>> {
    let upper = len.max(2);
    prop::collection::vec(1..upper, 0..16).prop_map(move |mut cuts| {
        cuts.retain(|&c| c < len);
        cuts.sort_unstable();
        cuts.dedup();
        cuts
    })
}

/// Cuts `bytes` at the given offsets.
pub fn split_at_points<'a>(bytes: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &cut in cuts {
        chunks.push(&bytes[start..cut]);
        start = cut;
    }
    chunks.push(&bytes[start..]);
    chunks
}
