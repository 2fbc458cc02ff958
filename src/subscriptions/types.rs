//! Event and subscription types.

use crate::liveness::TeardownReason;
use crate::reconcilers::controls::{Breakout, EntryExitTone, Reactions, RecordingState};
use crate::reconcilers::embedded_apps::EmbeddedApp;
use crate::reconcilers::host::HostState;
use crate::reconcilers::info::InfoState;
use crate::reconcilers::media_shares::MediaSharesState;
use crate::reconcilers::roster::{Participant, ParticipantDelta};
use crate::reconcilers::self_state::{MediaSession, MediaStatus, SelfInterpretation, SelfState};
use crate::types::{LocusState, MeetingType, ServiceLinks};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: SubscriptionFilter::default(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Event kinds to deliver (None = all kinds).
    pub kinds: Option<Vec<EventKind>>,

    /// Originating components to deliver (None = all components).
    pub components: Option<Vec<String>>,
}

impl SubscriptionFilter {
    /// Subscribe to everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Subscribe to specific event kinds.
    pub fn kinds(kinds: Vec<EventKind>) -> Self {
        Self {
            kinds: Some(kinds),
            ..Default::default()
        }
    }

    /// Subscribe to events raised by specific components.
    pub fn components(components: Vec<String>) -> Self {
        Self {
            components: Some(components),
            ..Default::default()
        }
    }

    pub fn matches(&self, event: &ScopedEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.event.kind()) {
                return false;
            }
        }

        if let Some(ref components) = self.components {
            if !components.iter().any(|c| c == event.scope.component) {
                return false;
            }
        }

        true
    }
}

/// Where an event was raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EventScope {
    pub component: &'static str,
    pub function: &'static str,
}

impl EventScope {
    pub const fn new(component: &'static str, function: &'static str) -> Self {
        Self {
            component,
            function,
        }
    }
}

impl fmt::Display for EventScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.component, self.function)
    }
}

/// An event together with its origin.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScopedEvent {
    pub scope: EventScope,
    pub event: LocusEvent,
}

/// Remote party reaction in a one-on-one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteResponse {
    Declined,
    Answered,
}

/// Every transition the engine publishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocusEvent {
    // --- Controls ---
    ControlsMuteOnEntryChanged {
        state: Value,
    },
    ControlsShareControlChanged {
        state: Value,
    },
    ControlsDisallowUnmuteChanged {
        state: Value,
    },
    ControlsReactionsChanged {
        state: Reactions,
    },
    ControlsViewTheParticipantsListChanged {
        state: Value,
    },
    ControlsRaiseHandChanged {
        state: Value,
    },
    ControlsVideoChanged {
        state: Value,
    },
    ControlsRecordingUpdated {
        state: RecordingState,
        modified_by: Option<String>,
        last_modified: Option<String>,
    },
    ControlsMeetingContainerUpdated {
        meeting_container_url: Option<String>,
    },
    ControlsMeetingTranscribeUpdated {
        transcribing: bool,
        caption: bool,
    },
    ControlsMeetingManualCaptionUpdated {
        enabled: bool,
    },
    ControlsEntryExitToneUpdated {
        entry_exit_tone: EntryExitTone,
    },
    ControlsMeetingBreakoutUpdated {
        breakout: Breakout,
    },
    ControlsMeetingInterpretationUpdated {
        interpretation: Value,
    },

    // --- Full state ---
    FullStateMeetingStateChange {
        previous_state: Option<LocusState>,
        current_state: LocusState,
    },
    FullStateTypeUpdate {
        meeting_type: MeetingType,
    },

    // --- Host ---
    LocusInfoUpdateHost {
        new_host: HostState,
        old_host: Option<HostState>,
    },
    LocusInfoCanAssignHost {
        can_assign_host: bool,
    },

    // --- Info ---
    MeetingLocked {
        info: InfoState,
    },
    MeetingUnlocked {
        info: InfoState,
    },
    MeetingInfoUpdated {
        is_initializing: bool,
    },

    // --- Media shares / embedded apps ---
    LocusInfoUpdateMediaShares {
        current: MediaSharesState,
        previous: Option<MediaSharesState>,
    },
    EmbeddedAppsUpdated {
        apps: Vec<EmbeddedApp>,
    },

    // --- Self ---
    ControlsMeetingLayoutUpdated {
        layout: Option<String>,
    },
    DisconnectDueToInactivity {
        reason: Option<String>,
    },
    SelfModeratorChanged {
        moderator: bool,
    },
    SelfRolesChanged {
        old_roles: Option<Vec<String>>,
        new_roles: Vec<String>,
    },
    SelfRemoteVideoMuteStatusUpdated {
        muted: Option<bool>,
    },
    LocalUnmuteRequired {
        muted: Option<bool>,
        unmute_allowed: Option<bool>,
    },
    SelfRemoteMuteStatusUpdated {
        muted: Option<bool>,
        unmute_allowed: Option<bool>,
    },
    LocalUnmuteRequested,
    SelfUnadmittedGuest {
        self_id: Option<String>,
    },
    SelfAdmittedGuest {
        self_id: Option<String>,
    },
    MediaInactivity {
        status: MediaStatus,
    },
    MediaStatusChange {
        audio: Option<MediaSession>,
        video: Option<MediaSession>,
        share: Option<MediaSession>,
    },
    SelfObserving,
    SelfCannotViewParticipantListChange {
        can_not_view_the_participant_list: bool,
    },
    SelfIsSharingBlockedChange {
        is_sharing_blocked: bool,
    },
    SelfMeetingBreakoutsChanged {
        breakout_sessions: Value,
    },
    SelfMeetingInterpretationChanged {
        interpretation: SelfInterpretation,
        self_participant_id: Option<String>,
    },
    LocusInfoUpdateSelf {
        old_self: Option<Box<SelfState>>,
        new_self: Box<SelfState>,
    },

    // --- Roster ---
    LocusInfoUpdateParticipants {
        participants: Vec<Participant>,
        deltas: Vec<ParticipantDelta>,
        recording_id: Option<String>,
        self_identity: Option<String>,
        self_id: Option<String>,
        host_id: Option<String>,
        /// The list replaces the known members instead of updating them.
        is_replace: bool,
    },

    // --- Session ---
    LocusInfoUpdateUrl {
        url: String,
    },
    LinksServices {
        services: ServiceLinks,
    },
    RemoteResponse {
        response: RemoteResponse,
    },
    DestroyMeeting {
        reason: TeardownReason,
        should_leave: bool,
    },

    // --- Lifecycle ---
    /// Subscription was dropped.
    Dropped {
        reason: DropReason,
    },
}

/// Payload-free discriminant of [`LocusEvent`], used for filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ControlsMuteOnEntryChanged,
    ControlsShareControlChanged,
    ControlsDisallowUnmuteChanged,
    ControlsReactionsChanged,
    ControlsViewTheParticipantsListChanged,
    ControlsRaiseHandChanged,
    ControlsVideoChanged,
    ControlsRecordingUpdated,
    ControlsMeetingContainerUpdated,
    ControlsMeetingTranscribeUpdated,
    ControlsMeetingManualCaptionUpdated,
    ControlsEntryExitToneUpdated,
    ControlsMeetingBreakoutUpdated,
    ControlsMeetingInterpretationUpdated,
    FullStateMeetingStateChange,
    FullStateTypeUpdate,
    LocusInfoUpdateHost,
    LocusInfoCanAssignHost,
    MeetingLocked,
    MeetingUnlocked,
    MeetingInfoUpdated,
    LocusInfoUpdateMediaShares,
    EmbeddedAppsUpdated,
    ControlsMeetingLayoutUpdated,
    DisconnectDueToInactivity,
    SelfModeratorChanged,
    SelfRolesChanged,
    SelfRemoteVideoMuteStatusUpdated,
    LocalUnmuteRequired,
    SelfRemoteMuteStatusUpdated,
    LocalUnmuteRequested,
    SelfUnadmittedGuest,
    SelfAdmittedGuest,
    MediaInactivity,
    MediaStatusChange,
    SelfObserving,
    SelfCannotViewParticipantListChange,
    SelfIsSharingBlockedChange,
    SelfMeetingBreakoutsChanged,
    SelfMeetingInterpretationChanged,
    LocusInfoUpdateSelf,
    LocusInfoUpdateParticipants,
    LocusInfoUpdateUrl,
    LinksServices,
    RemoteResponse,
    DestroyMeeting,
    Dropped,
}

impl LocusEvent {
    pub fn kind(&self) -> EventKind {
        use LocusEvent as E;

        match self {
            E::ControlsMuteOnEntryChanged { .. } => EventKind::ControlsMuteOnEntryChanged,
            E::ControlsShareControlChanged { .. } => EventKind::ControlsShareControlChanged,
            E::ControlsDisallowUnmuteChanged { .. } => EventKind::ControlsDisallowUnmuteChanged,
            E::ControlsReactionsChanged { .. } => EventKind::ControlsReactionsChanged,
            E::ControlsViewTheParticipantsListChanged { .. } => {
                EventKind::ControlsViewTheParticipantsListChanged
            }
            E::ControlsRaiseHandChanged { .. } => EventKind::ControlsRaiseHandChanged,
            E::ControlsVideoChanged { .. } => EventKind::ControlsVideoChanged,
            E::ControlsRecordingUpdated { .. } => EventKind::ControlsRecordingUpdated,
            E::ControlsMeetingContainerUpdated { .. } => EventKind::ControlsMeetingContainerUpdated,
            E::ControlsMeetingTranscribeUpdated { .. } => {
                EventKind::ControlsMeetingTranscribeUpdated
            }
            E::ControlsMeetingManualCaptionUpdated { .. } => {
                EventKind::ControlsMeetingManualCaptionUpdated
            }
            E::ControlsEntryExitToneUpdated { .. } => EventKind::ControlsEntryExitToneUpdated,
            E::ControlsMeetingBreakoutUpdated { .. } => EventKind::ControlsMeetingBreakoutUpdated,
            E::ControlsMeetingInterpretationUpdated { .. } => {
                EventKind::ControlsMeetingInterpretationUpdated
            }
            E::FullStateMeetingStateChange { .. } => EventKind::FullStateMeetingStateChange,
            E::FullStateTypeUpdate { .. } => EventKind::FullStateTypeUpdate,
            E::LocusInfoUpdateHost { .. } => EventKind::LocusInfoUpdateHost,
            E::LocusInfoCanAssignHost { .. } => EventKind::LocusInfoCanAssignHost,
            E::MeetingLocked { .. } => EventKind::MeetingLocked,
            E::MeetingUnlocked { .. } => EventKind::MeetingUnlocked,
            E::MeetingInfoUpdated { .. } => EventKind::MeetingInfoUpdated,
            E::LocusInfoUpdateMediaShares { .. } => EventKind::LocusInfoUpdateMediaShares,
            E::EmbeddedAppsUpdated { .. } => EventKind::EmbeddedAppsUpdated,
            E::ControlsMeetingLayoutUpdated { .. } => EventKind::ControlsMeetingLayoutUpdated,
            E::DisconnectDueToInactivity { .. } => EventKind::DisconnectDueToInactivity,
            E::SelfModeratorChanged { .. } => EventKind::SelfModeratorChanged,
            E::SelfRolesChanged { .. } => EventKind::SelfRolesChanged,
            E::SelfRemoteVideoMuteStatusUpdated { .. } => {
                EventKind::SelfRemoteVideoMuteStatusUpdated
            }
            E::LocalUnmuteRequired { .. } => EventKind::LocalUnmuteRequired,
            E::SelfRemoteMuteStatusUpdated { .. } => EventKind::SelfRemoteMuteStatusUpdated,
            E::LocalUnmuteRequested => EventKind::LocalUnmuteRequested,
            E::SelfUnadmittedGuest { .. } => EventKind::SelfUnadmittedGuest,
            E::SelfAdmittedGuest { .. } => EventKind::SelfAdmittedGuest,
            E::MediaInactivity { .. } => EventKind::MediaInactivity,
            E::MediaStatusChange { .. } => EventKind::MediaStatusChange,
            E::SelfObserving => EventKind::SelfObserving,
            E::SelfCannotViewParticipantListChange { .. } => {
                EventKind::SelfCannotViewParticipantListChange
            }
            E::SelfIsSharingBlockedChange { .. } => EventKind::SelfIsSharingBlockedChange,
            E::SelfMeetingBreakoutsChanged { .. } => EventKind::SelfMeetingBreakoutsChanged,
            E::SelfMeetingInterpretationChanged { .. } => {
                EventKind::SelfMeetingInterpretationChanged
            }
            E::LocusInfoUpdateSelf { .. } => EventKind::LocusInfoUpdateSelf,
            E::LocusInfoUpdateParticipants { .. } => EventKind::LocusInfoUpdateParticipants,
            E::LocusInfoUpdateUrl { .. } => EventKind::LocusInfoUpdateUrl,
            E::LinksServices { .. } => EventKind::LinksServices,
            E::RemoteResponse { .. } => EventKind::RemoteResponse,
            E::DestroyMeeting { .. } => EventKind::DestroyMeeting,
            E::Dropped { .. } => EventKind::Dropped,
        }
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The engine ended the session.
    SessionEnded,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<ScopedEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ScopedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ScopedEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ScopedEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered, without blocking.
    pub fn drain(&self) -> Vec<ScopedEvent> {
        self.receiver.try_iter().collect()
    }
}
