//! Main engine tying the sequencer, the state reconciler and event delivery
//! together.

use crate::error::{LocusError, Result};
use crate::liveness::Teardown;
use crate::sequencer::{Action, ResyncRequest, ResyncState, Sequencer};
use crate::state::{CanonicalState, Pass, StateReconciler};
use crate::subscriptions::{
    DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
use crate::types::{MeetingUpdate, RawSnapshot};
use tracing::{info, warn};

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// URL of the local device; picks "this device" out of `self.devices`.
    pub device_url: Option<String>,

    /// Default per-subscriber event buffer.
    /// Default: 1000
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_url: None,
            event_buffer_size: 1000,
        }
    }
}

/// Receives the fields the owning session merges into its visible state.
pub trait MeetingSink: Send {
    fn update_meeting(&mut self, update: MeetingUpdate);
}

impl MeetingSink for crossbeam_channel::Sender<MeetingUpdate> {
    fn update_meeting(&mut self, update: MeetingUpdate) {
        // A session that stopped listening has nothing left to update.
        let _ = self.send(update);
    }
}

/// Out-of-band source of full snapshots, used to recover from a desync.
pub trait FullSnapshotSource {
    /// Fetch the current full snapshot. `hint` is the sync URL of the last
    /// working copy, when the server provided one.
    fn fetch_full_snapshot(&mut self, hint: Option<&str>) -> Result<RawSnapshot>;
}

/// What happened to a delivered snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Reconciled; events were published.
    Applied,
    /// Stale or duplicate; nothing happened.
    AlreadyCurrent,
    /// A gap was detected (or the engine is still paused). `resync_needed`
    /// is true when no fetch is in flight and the caller should start one.
    Desync { resync_needed: bool },
    /// Not a locus snapshot.
    Ignored,
}

/// The synchronization engine for one meeting session.
pub struct LocusEngine {
    config: EngineConfig,
    sequencer: Sequencer,
    reconciler: StateReconciler,
    subscriptions: SubscriptionManager,
    sink: Option<Box<dyn MeetingSink>>,
    /// Set once the liveness rules declared the session over.
    ended: Option<Teardown>,
}

impl LocusEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            reconciler: StateReconciler::new(config.device_url.clone()),
            config,
            sequencer: Sequencer::new(),
            subscriptions: SubscriptionManager::new(),
            sink: None,
            ended: None,
        }
    }

    /// Engine that forwards session updates to `sink`.
    pub fn with_sink(config: EngineConfig, sink: impl MeetingSink + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            ..Self::new(config)
        }
    }

    // --- Inbound ---

    /// Handle one inbound snapshot.
    ///
    /// Malformed domains never fail delivery; they are skipped for the pass.
    /// Delivery only fails once the session has ended.
    pub fn deliver(&mut self, snapshot: RawSnapshot) -> Result<DeliveryOutcome> {
        if self.ended.is_some() {
            return Err(LocusError::SessionEnded);
        }

        // Judged on what arrived, not on the merged working copy.
        let self_moved = snapshot.is_self_moved();

        let action = match self.sequencer.accept(snapshot) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "ignoring inbound object");
                return Ok(DeliveryOutcome::Ignored);
            }
        };

        match action {
            Action::Apply if self_moved => {
                info!("self moved to another session, not reconciling snapshot");
                Ok(DeliveryOutcome::Applied)
            }
            Action::Apply => {
                let Some(working_copy) = self.sequencer.working_copy() else {
                    return Ok(DeliveryOutcome::AlreadyCurrent);
                };
                let pass = self.reconciler.apply(working_copy);
                self.publish(pass);
                Ok(DeliveryOutcome::Applied)
            }
            Action::AlreadyCurrent => Ok(DeliveryOutcome::AlreadyCurrent),
            Action::Desync => Ok(DeliveryOutcome::Desync {
                resync_needed: self.sequencer.resync_state() == ResyncState::Needed,
            }),
        }
    }

    /// Decode and deliver a JSON payload.
    pub fn deliver_json(&mut self, bytes: &[u8]) -> Result<DeliveryOutcome> {
        match RawSnapshot::from_slice(bytes) {
            Ok(snapshot) => self.deliver(snapshot),
            Err(e) => {
                warn!(error = %e, "undecodable locus payload");
                Ok(DeliveryOutcome::Ignored)
            }
        }
    }

    // --- Resync ---

    /// Claim the pending resync. Returns `None` unless the engine is paused
    /// and no fetch is already in flight.
    pub fn begin_resync(&mut self) -> Option<ResyncRequest> {
        self.sequencer.begin_resync()
    }

    /// The fetch failed. The engine stays paused and a later
    /// `begin_resync()` may try again.
    pub fn abort_resync(&mut self) {
        self.sequencer.abort_resync();
    }

    /// Install a freshly fetched full snapshot, reconcile it wholesale and
    /// resume delta processing.
    pub fn complete_resync(&mut self, snapshot: RawSnapshot) -> Result<()> {
        if self.sequencer.resync_state() != ResyncState::InFlight {
            return Err(LocusError::InvalidSnapshot(
                "no resync in flight".to_string(),
            ));
        }
        if snapshot.sequence.is_none() || snapshot.is_delta() {
            self.sequencer.abort_resync();
            return Err(LocusError::InvalidSnapshot(
                "resync requires a full snapshot".to_string(),
            ));
        }

        self.sequencer.replace_working_copy(snapshot);
        if let Some(working_copy) = self.sequencer.working_copy() {
            let pass = self.reconciler.apply_wholesale(working_copy);
            self.publish(pass);
        }
        self.sequencer.resume();

        Ok(())
    }

    /// Run one full resync against `source`.
    ///
    /// No-op when nothing is pending. On fetch failure the engine stays
    /// paused and the error is returned; no teardown is triggered.
    pub fn resync<S: FullSnapshotSource + ?Sized>(&mut self, source: &mut S) -> Result<()> {
        match self.sequencer.resync_state() {
            ResyncState::Idle => return Ok(()),
            ResyncState::InFlight => return Err(LocusError::ResyncInProgress),
            ResyncState::Needed => {}
        }

        let Some(request) = self.sequencer.begin_resync() else {
            return Err(LocusError::ResyncInProgress);
        };
        info!(sync_url = ?request.sync_url, "fetching full locus snapshot");

        match source.fetch_full_snapshot(request.sync_url.as_deref()) {
            Ok(snapshot) => self.complete_resync(snapshot),
            Err(e) => {
                warn!(error = %e, "full snapshot fetch failed, staying paused");
                self.sequencer.abort_resync();
                Err(e)
            }
        }
    }

    // --- Outbound ---

    fn publish(&mut self, pass: Pass) {
        if let Some(sink) = self.sink.as_mut() {
            for update in pass.meeting_updates {
                sink.update_meeting(update);
            }
        }

        for scoped in pass.events {
            self.subscriptions.broadcast(scoped.scope, scoped.event);
        }

        if let Some(teardown) = pass.teardown {
            self.ended = Some(teardown);
        }
    }

    /// Subscribe to events with the engine's buffer size.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> SubscriptionHandle {
        self.subscribe_with(SubscriptionConfig {
            buffer_size: self.config.event_buffer_size,
            filter,
        })
    }

    pub fn subscribe_with(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.subscriptions.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }

    /// Release subscribers. The owning session calls this when it disposes
    /// of the meeting.
    pub fn dispose(&mut self) {
        self.subscriptions.close_all(DropReason::SessionEnded);
    }

    // --- Accessors ---

    pub fn state(&self) -> &CanonicalState {
        self.reconciler.state()
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn is_paused(&self) -> bool {
        self.sequencer.is_paused()
    }

    /// The teardown that ended the session, if any.
    pub fn teardown(&self) -> Option<Teardown> {
        self.ended
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for LocusEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
