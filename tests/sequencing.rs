//! Ordering, delta merge and resync tests.

use locus_sync::sequencer::{compare, compare_sequences, Comparison, DeltaAction};
use locus_sync::{
    DeliveryOutcome, EngineConfig, EventKind, FullSnapshotSource, LocusEngine, LocusEvent,
    LocusSequence, RawSnapshot, ResyncState, Result, SubscriptionFilter,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn sequence(n: u64) -> Value {
    json!({"entries": [n], "rangeStart": 0, "rangeEnd": 0})
}

fn full(n: u64, mut body: Value) -> RawSnapshot {
    body["sequence"] = sequence(n);
    RawSnapshot::from_value(body).unwrap()
}

fn delta(n: u64, base: u64, mut body: Value) -> RawSnapshot {
    body["sequence"] = sequence(n);
    body["baseSequence"] = sequence(base);
    RawSnapshot::from_value(body).unwrap()
}

fn participant(id: &str, identity: &str, state: &str) -> Value {
    json!({
        "id": id,
        "identity": identity,
        "person": {"id": identity},
        "state": state,
        "type": "USER"
    })
}

fn meeting(host: &str) -> Value {
    json!({
        "url": "https://locus/loci/1",
        "syncUrl": "https://locus/loci/1/sync",
        "fullState": {"type": "MEETING", "state": "ACTIVE"},
        "self": {"id": "self-1", "state": "JOINED", "person": {"id": "alice"}},
        "host": {"id": host},
        "participants": [
            participant("self-1", "alice", "JOINED"),
            participant("p-bob", "bob", "JOINED")
        ]
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn engine() -> LocusEngine {
    LocusEngine::new(EngineConfig::default())
}

struct Server {
    snapshot: RawSnapshot,
    fetches: usize,
}

impl FullSnapshotSource for Server {
    fn fetch_full_snapshot(&mut self, _hint: Option<&str>) -> Result<RawSnapshot> {
        self.fetches += 1;
        Ok(self.snapshot.clone())
    }
}

// --- Ordering ---

#[test]
fn test_stale_full_snapshot_is_ignored() {
    let mut engine = engine();
    engine.deliver(full(5, meeting("bob"))).unwrap();

    let outcome = engine.deliver(full(3, meeting("carol"))).unwrap();
    assert_eq!(outcome, DeliveryOutcome::AlreadyCurrent);
    assert_eq!(engine.state().host_id(), Some("bob"));
}

#[test]
fn test_old_delta_is_ignored() {
    let mut engine = engine();
    engine.deliver(full(5, meeting("bob"))).unwrap();

    let outcome = engine
        .deliver(delta(4, 3, json!({"host": {"id": "carol"}})))
        .unwrap();
    assert_eq!(outcome, DeliveryOutcome::AlreadyCurrent);
    assert_eq!(engine.state().host_id(), Some("bob"));
    assert!(!engine.is_paused());
}

#[test]
fn test_delta_chain_applies_in_order() {
    let mut engine = engine();
    engine.deliver(full(1, meeting("bob"))).unwrap();

    for (n, host) in [(2, "carol"), (3, "dave"), (4, "erin")] {
        let outcome = engine
            .deliver(delta(n, n - 1, json!({"host": {"id": host}})))
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Applied);
    }

    assert_eq!(engine.state().host_id(), Some("erin"));
    assert_eq!(engine.sequencer().last_applied_sequence(), Some(4));
}

#[test]
fn test_delta_before_full_needs_resync() {
    let mut engine = engine();
    let outcome = engine
        .deliver(delta(2, 1, json!({"host": {"id": "bob"}})))
        .unwrap();

    assert_eq!(outcome, DeliveryOutcome::Desync { resync_needed: true });
    assert!(engine.is_paused());
    assert!(engine.state().host.is_none());
}

#[test]
fn test_participants_merge_by_id() {
    let mut engine = engine();
    engine.deliver(full(1, meeting("bob"))).unwrap();

    engine
        .deliver(delta(
            2,
            1,
            json!({"participants": [
                participant("p-bob", "bob", "LEFT"),
                participant("p-carol", "carol", "JOINED")
            ]}),
        ))
        .unwrap();

    let participants = &engine.state().participants;
    assert_eq!(participants.len(), 3);
    assert_eq!(participants[0].identity.as_deref(), Some("alice"));
    assert_eq!(
        participants[1].state,
        Some(locus_sync::ParticipantState::Left)
    );
    assert_eq!(participants[2].identity.as_deref(), Some("carol"));
}

#[test]
fn test_moved_locus_skips_base_check() {
    let mut engine = engine();
    engine.deliver(full(1, meeting("bob"))).unwrap();
    let events = engine.subscribe(SubscriptionFilter::kinds(vec![EventKind::LocusInfoUpdateUrl]));

    // Base does not match, but the delta belongs to another locus.
    let moved = delta(
        5,
        4,
        json!({"url": "https://locus/loci/2", "host": {"id": "carol"}}),
    );
    assert_eq!(engine.deliver(moved).unwrap(), DeliveryOutcome::Applied);

    assert_eq!(engine.state().url.as_deref(), Some("https://locus/loci/2"));
    assert_eq!(
        events.drain().into_iter().map(|e| e.event).collect::<Vec<_>>(),
        vec![LocusEvent::LocusInfoUpdateUrl {
            url: "https://locus/loci/2".to_string()
        }]
    );
}

// --- Resync ---

#[test]
fn test_gap_recovery() {
    init_tracing();
    let mut engine = engine();
    engine.deliver(full(1, meeting("bob"))).unwrap();
    let events = engine.subscribe(SubscriptionFilter::all());

    let gap = delta(3, 2, json!({"host": {"id": "zed"}}));
    assert_eq!(
        engine.deliver(gap).unwrap(),
        DeliveryOutcome::Desync { resync_needed: true }
    );
    assert_eq!(engine.sequencer().resync_state(), ResyncState::Needed);

    // Deltas keep being dropped while paused.
    assert_eq!(
        engine
            .deliver(delta(4, 3, json!({"host": {"id": "zed"}})))
            .unwrap(),
        DeliveryOutcome::Desync { resync_needed: true }
    );
    assert_eq!(engine.state().host_id(), Some("bob"));

    let mut server = Server {
        snapshot: full(10, meeting("carol")),
        fetches: 0,
    };
    engine.resync(&mut server).unwrap();
    assert_eq!(server.fetches, 1);
    assert!(!engine.is_paused());
    assert_eq!(engine.state().host_id(), Some("carol"));

    let kinds: Vec<EventKind> = events.drain().iter().map(|e| e.event.kind()).collect();
    assert!(kinds.contains(&EventKind::LocusInfoUpdateHost));
    // Only real differences surface as transitions.
    assert!(!kinds.contains(&EventKind::SelfModeratorChanged));
    assert!(!kinds.contains(&EventKind::LocusInfoUpdateUrl));

    assert_eq!(
        engine
            .deliver(delta(11, 10, json!({"host": {"id": "dave"}})))
            .unwrap(),
        DeliveryOutcome::Applied
    );
    assert_eq!(engine.state().host_id(), Some("dave"));
}

#[test]
fn test_resync_when_idle_is_noop() {
    let mut engine = engine();
    engine.deliver(full(1, meeting("bob"))).unwrap();

    let mut server = Server {
        snapshot: full(10, meeting("carol")),
        fetches: 0,
    };
    engine.resync(&mut server).unwrap();

    assert_eq!(server.fetches, 0);
    assert_eq!(engine.state().host_id(), Some("bob"));
}

#[test]
fn test_full_snapshot_while_paused_does_not_resume() {
    let mut engine = engine();
    engine.deliver(full(1, meeting("bob"))).unwrap();
    engine
        .deliver(delta(3, 2, json!({"host": {"id": "zed"}})))
        .unwrap();

    assert_eq!(
        engine.deliver(full(10, meeting("carol"))).unwrap(),
        DeliveryOutcome::Applied
    );
    assert_eq!(engine.state().host_id(), Some("carol"));
    assert!(engine.is_paused());
    assert!(engine.begin_resync().is_some());
}

// --- Comparison properties ---

fn entries_only(entries: Vec<u64>) -> LocusSequence {
    LocusSequence::entries(entries)
}

proptest! {
    #[test]
    fn prop_sequence_equals_itself(
        start in 0u64..1000,
        width in 0u64..100,
        offsets in prop::collection::btree_set(1u64..500, 0..8),
    ) {
        let range_end = if start == 0 { 0 } else { start + width };
        // Entries always follow the compressed range.
        let entries: Vec<u64> = offsets.into_iter().map(|o| range_end + o).collect();
        let seq = LocusSequence::ranged(start, range_end, entries);

        prop_assert_eq!(compare_sequences(&seq, &seq).0, Comparison::Equal);
    }

    #[test]
    fn prop_disjoint_entries_order_by_value(
        low in prop::collection::btree_set(1u64..1000, 1..6),
        high in prop::collection::btree_set(1000u64..2000, 1..6),
    ) {
        let older = entries_only(low.into_iter().collect());
        let newer = entries_only(high.into_iter().collect());

        prop_assert_eq!(compare_sequences(&older, &newer).0, Comparison::LessThan);
        prop_assert_eq!(compare_sequences(&newer, &older).0, Comparison::GreaterThan);
    }

    #[test]
    fn prop_contiguous_delta_applies(current in 1u64..10_000, step in 1u64..50) {
        let working = entries_only(vec![current]);
        let incoming = entries_only(vec![current + step]);
        let base = entries_only(vec![current]);

        prop_assert_eq!(compare(&working, &incoming, Some(&base)), DeltaAction::UseIncoming);
    }

    #[test]
    fn prop_base_ahead_is_desync(current in 1u64..10_000, gap in 1u64..50) {
        let working = entries_only(vec![current]);
        let base = entries_only(vec![current + gap]);
        let incoming = entries_only(vec![current + gap + 1]);

        prop_assert_eq!(compare(&working, &incoming, Some(&base)), DeltaAction::Desync);
    }
}
