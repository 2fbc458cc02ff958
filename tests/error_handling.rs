//! Error handling and edge case tests.

use locus_sync::reconcilers::{host, roster, self_state, ReconcileContext};
use locus_sync::{
    DeliveryOutcome, Domain, EngineConfig, EventKind, FullSnapshotSource, LocusEngine,
    LocusError, RawSnapshot, ResyncState, Result, SubscriptionFilter,
};
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

fn meeting() -> Value {
    json!({
        "url": "https://locus/loci/1",
        "fullState": {"type": "MEETING", "state": "ACTIVE"},
        "self": {"id": "self-1", "state": "JOINED", "person": {"id": "alice"}},
        "host": {"id": "bob"},
        "controls": {"record": {"recording": false, "paused": false}}
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct FlakyServer {
    failures_left: usize,
    snapshot: RawSnapshot,
}

impl FullSnapshotSource for FlakyServer {
    fn fetch_full_snapshot(&mut self, _hint: Option<&str>) -> Result<RawSnapshot> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(LocusError::Transport("connection reset".to_string()));
        }
        Ok(self.snapshot.clone())
    }
}

// --- Reconciler Errors ---

#[test]
fn test_missing_current_is_parameter_error() {
    let ctx = ReconcileContext::default();

    assert!(matches!(
        host::reconcile(None, None, &ctx),
        Err(LocusError::Parameter(_))
    ));
    assert!(matches!(
        self_state::reconcile(Some(&json!({"state": "JOINED"})), None, &ctx),
        Err(LocusError::Parameter(_))
    ));
}

#[test]
fn test_malformed_value_is_decode_error() {
    let ctx = ReconcileContext::default();

    match self_state::reconcile(None, Some(&json!({"state": 5})), &ctx) {
        Err(LocusError::Decode { domain, .. }) => assert_eq!(domain, Domain::Self_),
        other => panic!("expected decode error, got {:?}", other.map(|_| ())),
    }
    match roster::reconcile(None, Some(&json!({"not": "a list"})), &ctx) {
        Err(LocusError::Decode { domain, .. }) => assert_eq!(domain, Domain::Participants),
        other => panic!("expected decode error, got {:?}", other.map(|_| ())),
    }
}

// --- Domain Isolation ---

#[test]
fn test_malformed_domain_does_not_block_others() {
    init_tracing();
    let mut engine = LocusEngine::new(EngineConfig::default());
    engine.deliver(full(1, meeting())).unwrap();
    let events = engine.subscribe(SubscriptionFilter::kinds(vec![
        EventKind::ControlsRecordingUpdated,
        EventKind::LocusInfoUpdateHost,
    ]));

    let broken = delta(
        2,
        1,
        json!({"controls": {"record": "yes"}, "host": {"id": "carol"}}),
    );
    assert_eq!(engine.deliver(broken).unwrap(), DeliveryOutcome::Applied);

    let kinds: Vec<EventKind> = events.drain().iter().map(|e| e.event.kind()).collect();
    assert_eq!(kinds, vec![EventKind::LocusInfoUpdateHost]);
    assert_eq!(engine.state().host_id(), Some("carol"));
    assert!(engine
        .state()
        .controls
        .as_ref()
        .and_then(|c| c.record.as_ref())
        .is_some_and(|r| !r.recording));

    // The next well-formed value diffs against the last good one.
    let fixed = delta(3, 2, json!({"controls": {"record": {"recording": true}}}));
    engine.deliver(fixed).unwrap();
    let kinds: Vec<EventKind> = events.drain().iter().map(|e| e.event.kind()).collect();
    assert_eq!(kinds, vec![EventKind::ControlsRecordingUpdated]);
}

// --- Inbound Edge Cases ---

#[test]
fn test_non_locus_objects_are_ignored() {
    let mut engine = LocusEngine::new(EngineConfig::default());

    let no_sequence = RawSnapshot::from_value(json!({"host": {"id": "bob"}})).unwrap();
    assert_eq!(engine.deliver(no_sequence).unwrap(), DeliveryOutcome::Ignored);
    assert_eq!(engine.deliver_json(b"{\"sequence\": 7}").unwrap(), DeliveryOutcome::Ignored);
    assert_eq!(engine.deliver_json(b"[]").unwrap(), DeliveryOutcome::Ignored);

    assert!(engine.state().host.is_none());
    assert!(!engine.is_paused());
}

#[test]
fn test_delivery_after_teardown_fails() {
    let mut engine = LocusEngine::new(EngineConfig::default());
    engine.deliver(full(1, meeting())).unwrap();

    engine
        .deliver(delta(2, 1, json!({"fullState": {"type": "MEETING", "state": "INACTIVE"}})))
        .unwrap();
    assert!(engine.teardown().is_some());

    let result = engine.deliver(delta(3, 2, json!({"host": {"id": "carol"}})));
    assert!(matches!(result, Err(LocusError::SessionEnded)));
    assert_eq!(engine.state().host_id(), Some("bob"));
}

// --- Resync Errors ---

#[test]
fn test_failed_fetch_keeps_engine_paused() {
    init_tracing();
    let mut engine = LocusEngine::new(EngineConfig::default());
    engine.deliver(full(1, meeting())).unwrap();
    engine
        .deliver(delta(5, 4, json!({"host": {"id": "zed"}})))
        .unwrap();

    let mut server = FlakyServer {
        failures_left: 1,
        snapshot: full(10, meeting()),
    };

    let result = engine.resync(&mut server);
    assert!(matches!(result, Err(LocusError::Transport(_))));
    assert!(engine.is_paused());
    assert_eq!(engine.sequencer().resync_state(), ResyncState::Needed);
    assert!(engine.teardown().is_none());

    engine.resync(&mut server).unwrap();
    assert!(!engine.is_paused());
}

#[test]
fn test_complete_without_begin_is_rejected() {
    let mut engine = LocusEngine::new(EngineConfig::default());
    engine.deliver(full(1, meeting())).unwrap();

    let result = engine.complete_resync(full(10, meeting()));
    assert!(matches!(result, Err(LocusError::InvalidSnapshot(_))));
    assert_eq!(engine.state().host_id(), Some("bob"));
}

#[test]
fn test_resync_snapshot_without_sequence_is_rejected() {
    let mut engine = LocusEngine::new(EngineConfig::default());
    engine.deliver(full(1, meeting())).unwrap();
    engine
        .deliver(delta(5, 4, json!({"host": {"id": "zed"}})))
        .unwrap();
    assert!(engine.begin_resync().is_some());

    let unsequenced = RawSnapshot::from_value(meeting()).unwrap();
    assert!(matches!(
        engine.complete_resync(unsequenced),
        Err(LocusError::InvalidSnapshot(_))
    ));
    assert!(engine.is_paused());
    assert!(engine.begin_resync().is_some());
}
