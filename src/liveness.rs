//! Liveness detection: decides after each reconciliation pass whether the
//! session is over and why.

use crate::reconcilers::full_state::FullState;
use crate::reconcilers::roster::Participant;
use crate::reconcilers::self_state::SelfState;
use crate::types::{LocusState, MeetingType, ParticipantState};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeardownReason {
    /// Call-type session went inactive.
    CallInactive,
    /// The other party left a call we were part of.
    PartnerLeft,
    /// We left a call the other party never joined or already left.
    SelfLeft,
    MeetingInactiveTerminating,
    /// The server removed the session.
    FullstateRemoved,
    /// We were removed from the meeting.
    SelfRemoved,
}

/// A teardown declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Teardown {
    pub reason: TeardownReason,
    /// The client still has to send an explicit `leave`.
    pub should_leave: bool,
}

impl Teardown {
    fn new(reason: TeardownReason, should_leave: bool) -> Self {
        Self {
            reason,
            should_leave,
        }
    }
}

/// Everything the detector looks at, as of the end of a pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct LivenessInput<'a> {
    pub full_state: Option<&'a FullState>,
    pub self_state: Option<&'a SelfState>,
    pub partner: Option<&'a Participant>,
}

/// Evaluate the teardown rules. Returns `None` while the session is alive.
///
/// Not idempotent: a snapshot that keeps the qualifying condition will
/// declare again, so callers only run this on passes that changed state.
pub fn check(input: LivenessInput<'_>) -> Option<Teardown> {
    let full_state = input.full_state?;

    match full_state.kind {
        Some(kind) if kind.is_call() => check_call(full_state, input.self_state, input.partner),
        Some(MeetingType::Meeting) => check_meeting(full_state, input.self_state),
        _ => {
            warn!(kind = ?full_state.kind, "meeting type is unknown");
            None
        }
    }
}

fn check_call(
    full_state: &FullState,
    self_state: Option<&SelfState>,
    partner: Option<&Participant>,
) -> Option<Teardown> {
    use ParticipantState::*;

    if full_state.state == Some(LocusState::Inactive) {
        warn!("call ended, locus state is inactive");
        return Some(Teardown::new(TeardownReason::CallInactive, false));
    }

    let self_state = self_state?;
    let partner_state = partner.and_then(|p| p.state);

    if partner_state == Some(Left)
        && matches!(self_state.state, Some(Declined | Notified | Joined))
    {
        let should_leave = self_state
            .joined_with
            .as_ref()
            .is_some_and(|device| device.state != Some(Left));
        return Some(Teardown::new(TeardownReason::PartnerLeft, should_leave));
    }

    // A partner still IDLE joined without media.
    if self_state.state == Some(Left)
        && matches!(partner_state, Some(Left | Declined | Notified | Idle))
    {
        return Some(Teardown::new(TeardownReason::SelfLeft, false));
    }

    None
}

fn check_meeting(full_state: &FullState, self_state: Option<&SelfState>) -> Option<Teardown> {
    if matches!(full_state.state, Some(LocusState::Inactive | LocusState::Terminating)) {
        warn!("meeting is ending due to inactive or terminating");
        return Some(Teardown::new(TeardownReason::MeetingInactiveTerminating, false));
    }

    if full_state.removed {
        return Some(Teardown::new(TeardownReason::FullstateRemoved, false));
    }

    // Guests get no further events once removed.
    if self_state.is_some_and(|s| s.removed) {
        return Some(Teardown::new(TeardownReason::SelfRemoved, false));
    }

    None
}
