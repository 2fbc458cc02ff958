//! Snapshot sequencer: the sole authority on ordering.

use super::comparison::{compare, compare_sequences, Comparison, DeltaAction};
use super::merge::apply_delta;
use crate::error::{LocusError, Result};
use crate::types::RawSnapshot;
use tracing::{debug, info};

/// Classification of an inbound snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// The working copy advanced; reconcile it.
    Apply,
    /// Stale or duplicate re-delivery; discard silently.
    AlreadyCurrent,
    /// The delta cannot be applied against the working copy. The sequencer
    /// is paused until a fresh full snapshot arrives and `resume()` is called.
    Desync,
}

/// Progress of the out-of-band full resync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResyncState {
    Idle,
    /// Paused, waiting for the caller to start a fetch.
    Needed,
    /// A fetch has been handed out and not completed.
    InFlight,
}

/// What the caller needs to fetch a fresh full snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResyncRequest {
    /// Server-provided sync URL of the working copy, if any.
    pub sync_url: Option<String>,
    /// Locus URL of the working copy, if any.
    pub locus_url: Option<String>,
}

/// Orders inbound snapshots against the last accepted working copy.
#[derive(Debug)]
pub struct Sequencer {
    /// Last accepted full state (deltas merged in).
    working_copy: Option<RawSnapshot>,
    /// No delta is applied while paused.
    paused: bool,
    resync: ResyncState,
    /// Highest sequence number applied.
    last_applied: Option<u64>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            working_copy: None,
            paused: false,
            resync: ResyncState::Idle,
            last_applied: None,
        }
    }

    /// Classify a snapshot, merging it into the working copy on `Apply`.
    ///
    /// Returns an error only for objects that are not locus snapshots (no
    /// sequence marker); those leave the sequencer untouched.
    pub fn accept(&mut self, snapshot: RawSnapshot) -> Result<Action> {
        let Some(sequence) = snapshot.sequence.as_ref() else {
            return Err(LocusError::InvalidSnapshot(
                "snapshot has no sequence marker".to_string(),
            ));
        };
        let incoming_max = sequence.max_sequence();

        let action = if snapshot.is_delta() {
            self.accept_delta(snapshot)
        } else {
            self.accept_full(snapshot)
        };

        if action == Action::Apply {
            self.last_applied = incoming_max.or(self.last_applied);
        }

        Ok(action)
    }

    fn accept_full(&mut self, snapshot: RawSnapshot) -> Action {
        if !self.is_new_full(&snapshot) {
            info!("ignoring old full locus snapshot");
            return Action::AlreadyCurrent;
        }

        self.working_copy = Some(snapshot);
        Action::Apply
    }

    fn accept_delta(&mut self, delta: RawSnapshot) -> Action {
        if self.paused {
            debug!("sequencer paused, dropping delta");
            return Action::Desync;
        }

        let Some(working_copy) = self.working_copy.as_ref() else {
            info!("delta received before any full snapshot");
            self.pause();
            return Action::Desync;
        };

        let (Some(current), Some(incoming)) = (&working_copy.sequence, &delta.sequence) else {
            self.pause();
            return Action::Desync;
        };

        let action = match (&working_copy.url, &delta.url) {
            (Some(current_url), Some(incoming_url)) if current_url != incoming_url => {
                // Moved to another locus: the base sequence belongs to a
                // different resource and cannot be checked.
                match compare_sequences(current, incoming).0 {
                    Comparison::LessThan => DeltaAction::UseIncoming,
                    _ => DeltaAction::UseCurrent,
                }
            }
            _ => compare(current, incoming, delta.base_sequence.as_ref()),
        };

        info!(?action, "locus delta action");

        match action {
            DeltaAction::UseIncoming => {
                let merged = apply_delta(working_copy, &delta);
                self.working_copy = Some(merged);
                Action::Apply
            }
            DeltaAction::UseCurrent => Action::AlreadyCurrent,
            DeltaAction::Desync => {
                self.pause();
                Action::Desync
            }
        }
    }

    /// A full snapshot is new if there is nothing to compare against, or its
    /// highest sequence is above the working copy's.
    pub fn is_new_full(&self, snapshot: &RawSnapshot) -> bool {
        let Some(incoming) = snapshot.sequence.as_ref() else {
            return false;
        };
        let Some(incoming_max) = incoming.max_sequence() else {
            return true;
        };
        let current_max = self
            .working_copy
            .as_ref()
            .and_then(|copy| copy.sequence.as_ref())
            .and_then(|sequence| sequence.max_sequence());

        match current_max {
            Some(current_max) => incoming_max > current_max,
            None => true,
        }
    }

    fn pause(&mut self) {
        if !self.paused {
            info!("locus sequencer paused");
            self.paused = true;
            self.resync = ResyncState::Needed;
        }
    }

    /// Hand out a resync request if one is needed and none is in flight.
    pub fn begin_resync(&mut self) -> Option<ResyncRequest> {
        if self.resync != ResyncState::Needed {
            return None;
        }

        self.resync = ResyncState::InFlight;
        let copy = self.working_copy.as_ref();
        Some(ResyncRequest {
            sync_url: copy.and_then(|c| c.sync_url.clone()),
            locus_url: copy.and_then(|c| c.url.clone()),
        })
    }

    /// The fetch failed; stay paused and allow another attempt.
    pub fn abort_resync(&mut self) {
        if self.resync == ResyncState::InFlight {
            self.resync = ResyncState::Needed;
        }
    }

    /// Replace the working copy with a freshly fetched full snapshot.
    pub fn replace_working_copy(&mut self, snapshot: RawSnapshot) {
        if let Some(max) = snapshot.sequence.as_ref().and_then(|s| s.max_sequence()) {
            self.last_applied = Some(max);
        }
        self.working_copy = Some(snapshot);
    }

    /// Resume applying deltas in arrival order.
    pub fn resume(&mut self) {
        info!("locus sequencer resumed");
        self.paused = false;
        self.resync = ResyncState::Idle;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn resync_state(&self) -> ResyncState {
        self.resync
    }

    pub fn working_copy(&self) -> Option<&RawSnapshot> {
        self.working_copy.as_ref()
    }

    pub fn last_applied_sequence(&self) -> Option<u64> {
        self.last_applied
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
