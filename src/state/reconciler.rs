//! State reconciler: drives the field reconcilers over an accepted snapshot,
//! merges their results into the canonical state and collects the events
//! and session updates the pass produced.

use super::cache::RawFieldCache;
use super::canonical::CanonicalState;
use crate::error::Result;
use crate::liveness::{self, LivenessInput, Teardown};
use crate::reconcilers::controls::{self, ControlsState, ControlsUpdates};
use crate::reconcilers::embedded_apps::{self, EmbeddedApp, EmbeddedAppsUpdates};
use crate::reconcilers::full_state::{self, FullState, FullStateUpdates};
use crate::reconcilers::host::{self, HostState, HostUpdates};
use crate::reconcilers::info::{self, InfoState, InfoUpdates};
use crate::reconcilers::media_shares::{self, MediaSharesState, MediaSharesUpdates};
use crate::reconcilers::roster::{self, Participant, RosterUpdates};
use crate::reconcilers::self_state::{self, SelfState, SelfUpdates};
use crate::reconcilers::{ReconcileContext, Reconciled};
use crate::subscriptions::{EventScope, LocusEvent, RemoteResponse, ScopedEvent};
use crate::types::{
    Domain, MeetingUpdate, RawSnapshot, ServiceLinks, EVENT_PARTICIPANT_DECLINED,
    EVENT_PARTICIPANT_JOIN,
};
use serde_json::Value;
use tracing::{debug, warn};

const COMPONENT: &str = "locus-info";

const fn scope(function: &'static str) -> EventScope {
    EventScope::new(COMPONENT, function)
}

/// Everything one reconciliation pass produced.
#[derive(Clone, Debug, Default)]
pub struct Pass {
    /// Events in emission order.
    pub events: Vec<ScopedEvent>,
    /// Partial session updates in emission order.
    pub meeting_updates: Vec<MeetingUpdate>,
    /// Domains that failed to decode and were left untouched.
    pub skipped: Vec<Domain>,
    /// Set when the liveness rules declared the session over.
    pub teardown: Option<Teardown>,
}

impl Pass {
    fn emit(&mut self, scope: EventScope, event: LocusEvent) {
        self.events.push(ScopedEvent { scope, event });
    }

    fn update_meeting(&mut self, update: MeetingUpdate) {
        if !update.is_empty() {
            self.meeting_updates.push(update);
        }
    }

    /// Event kinds produced, in order.
    pub fn kinds(&self) -> Vec<crate::subscriptions::EventKind> {
        self.events.iter().map(|e| e.event.kind()).collect()
    }
}

/// Transitions from earlier domains that later steps of the same pass read.
#[derive(Default)]
struct PassFlags {
    moderator_changed: bool,
    roles_changed: bool,
    new_host: bool,
    replace_members: bool,
}

/// Owns the canonical state and the raw field cache.
#[derive(Debug, Default)]
pub struct StateReconciler {
    device_url: Option<String>,
    cache: RawFieldCache,
    state: CanonicalState,
}

impl StateReconciler {
    pub fn new(device_url: Option<String>) -> Self {
        Self {
            device_url,
            cache: RawFieldCache::new(),
            state: CanonicalState::new(),
        }
    }

    pub fn state(&self) -> &CanonicalState {
        &self.state
    }

    pub fn cache(&self) -> &RawFieldCache {
        &self.cache
    }

    /// Reconcile the domains of `snapshot` that changed since the last pass.
    pub fn apply(&mut self, snapshot: &RawSnapshot) -> Pass {
        self.run(snapshot, false)
    }

    /// Reconcile every present domain regardless of the cache. Used after a
    /// resync replaced the working copy. Previous values still come from the
    /// cache, so only real differences surface as transitions.
    pub fn apply_wholesale(&mut self, snapshot: &RawSnapshot) -> Pass {
        self.run(snapshot, true)
    }

    fn run(&mut self, snapshot: &RawSnapshot, force: bool) -> Pass {
        let mut pass = Pass::default();
        let mut flags = PassFlags::default();

        // A moved self belongs to the locus we were moved out of; read as
        // ours it would look like we left.
        let self_moved = snapshot.is_self_moved();

        self.update_conversation_url(snapshot, &mut pass);

        for domain in Domain::ALL {
            let Some(raw) = snapshot.domain(domain) else {
                continue;
            };
            if domain == Domain::Self_ && self_moved {
                debug!("self moved to another session, keeping the last self");
                continue;
            }
            let unchanged = self.cache.is_unchanged(domain, raw);

            // Info also reruns when the roles it filters hints by changed.
            let rerun_info = domain == Domain::Info && flags.roles_changed;
            if unchanged && !force && !rerun_info {
                debug!(%domain, "domain unchanged, skipping");
                continue;
            }

            let result = self.reconcile_domain(domain, raw, snapshot, &mut flags, &mut pass);
            match result {
                Ok(()) => self.cache.insert(domain, raw.clone()),
                Err(e) => {
                    warn!(%domain, error = %e, "skipping domain for this pass");
                    pass.skipped.push(domain);
                }
            }
        }

        if flags.moderator_changed || flags.new_host {
            self.compare_self_and_host(&mut pass);
        }

        self.update_locus_url(snapshot, &mut pass);
        self.update_services(snapshot, &mut pass);
        self.update_partner(&mut pass);
        self.update_sip_uri(&mut pass);

        pass.teardown = self.check_liveness(&mut pass);
        self.handle_one_on_one_event(snapshot, &mut pass);

        pass
    }

    fn context(&self) -> ReconcileContext<'_> {
        ReconcileContext {
            device_url: self.device_url.as_deref(),
            roles: self.state.roles(),
            is_joined: self.state.is_joined(),
        }
    }

    fn reconcile_domain(
        &mut self,
        domain: Domain,
        raw: &Value,
        snapshot: &RawSnapshot,
        flags: &mut PassFlags,
        pass: &mut Pass,
    ) -> Result<()> {
        let previous = self.cache.get(domain);
        let ctx = self.context();

        match domain {
            Domain::Controls => {
                let result = controls::reconcile(previous, Some(raw), &ctx)?;
                flags.replace_members =
                    controls::is_need_replace_members(result.previous.as_ref(), &result.current);
                let move_id = snapshot.self_.as_ref().and_then(|raw_self| {
                    self_state::replaced_breakout_move_id(raw_self, self.device_url.as_deref())
                });
                self.on_controls(result, move_id, pass);
            }
            Domain::FullState => {
                let result = full_state::reconcile(previous, Some(raw), &ctx)?;
                self.on_full_state(result, pass);
            }
            Domain::Self_ => {
                let result = self_state::reconcile(previous, Some(raw), &ctx)?;
                flags.moderator_changed = result.updates.moderator_changed;
                flags.roles_changed = result.updates.is_roles_changed;
                self.on_self(result, pass);
            }
            Domain::Host => {
                let result = host::reconcile(previous, Some(raw), &ctx)?;
                flags.new_host = result.updates.is_new_host;
                self.on_host(result, pass);
            }
            Domain::Info => {
                let result = info::reconcile(previous, Some(raw), &ctx)?;
                self.on_info(result, pass);
            }
            Domain::MediaShares => {
                let result = media_shares::reconcile(previous, Some(raw), &ctx)?;
                self.on_media_shares(result, pass);
            }
            Domain::EmbeddedApps => {
                let result = embedded_apps::reconcile(previous, Some(raw), &ctx)?;
                self.on_embedded_apps(result, pass);
            }
            Domain::Participants => {
                let result = roster::reconcile(previous, Some(raw), &ctx)?;
                self.on_participants(result, flags.replace_members, pass);
            }
        }

        Ok(())
    }

    fn on_controls(
        &mut self,
        result: Reconciled<ControlsState, ControlsUpdates>,
        breakout_move_id: Option<String>,
        pass: &mut Pass,
    ) {
        const SCOPE: EventScope = scope("update_controls");
        let Reconciled {
            mut current,
            updates,
            ..
        } = result;

        let changes: [(bool, &Option<Value>, fn(Value) -> LocusEvent); 6] = [
            (updates.has_mute_on_entry_changed, &current.mute_on_entry, |state| {
                LocusEvent::ControlsMuteOnEntryChanged { state }
            }),
            (updates.has_share_control_changed, &current.share_control, |state| {
                LocusEvent::ControlsShareControlChanged { state }
            }),
            (updates.has_disallow_unmute_changed, &current.disallow_unmute, |state| {
                LocusEvent::ControlsDisallowUnmuteChanged { state }
            }),
            (
                updates.has_view_the_participant_list_changed,
                &current.view_the_participant_list,
                |state| LocusEvent::ControlsViewTheParticipantsListChanged { state },
            ),
            (updates.has_raise_hand_changed, &current.raise_hand, |state| {
                LocusEvent::ControlsRaiseHandChanged { state }
            }),
            (updates.has_video_changed, &current.video, |state| {
                LocusEvent::ControlsVideoChanged { state }
            }),
        ];
        for (changed, value, event) in changes {
            if let (true, Some(state)) = (changed, value) {
                pass.emit(SCOPE, event(state.clone()));
            }
        }

        if updates.has_reactions_changed || updates.has_reaction_display_names_changed {
            if let Some(reactions) = current.reactions.clone() {
                pass.emit(SCOPE, LocusEvent::ControlsReactionsChanged { state: reactions });
            }
        }

        if let (Some(state), Some(record)) = (
            controls::recording_state(&current, &updates),
            current.record.as_ref(),
        ) {
            pass.emit(
                SCOPE,
                LocusEvent::ControlsRecordingUpdated {
                    state,
                    modified_by: record.meta.modified_by.clone(),
                    last_modified: record.meta.last_modified.clone(),
                },
            );
        }

        if let (true, Some(container)) =
            (updates.has_meeting_container_changed, &current.meeting_container)
        {
            pass.emit(
                SCOPE,
                LocusEvent::ControlsMeetingContainerUpdated {
                    meeting_container_url: container.meeting_container_url.clone(),
                },
            );
        }

        if let (true, Some(transcribe)) = (updates.has_transcribe_changed, &current.transcribe) {
            pass.emit(
                SCOPE,
                LocusEvent::ControlsMeetingTranscribeUpdated {
                    transcribing: transcribe.transcribing,
                    caption: transcribe.caption,
                },
            );
        }

        if let (true, Some(caption)) =
            (updates.has_manual_caption_changed, &current.manual_caption_control)
        {
            pass.emit(
                SCOPE,
                LocusEvent::ControlsMeetingManualCaptionUpdated {
                    enabled: caption.enabled,
                },
            );
        }

        if let (true, Some(breakout)) = (updates.has_breakout_changed, current.breakout.as_mut()) {
            breakout.breakout_move_id = breakout_move_id;
            pass.emit(
                SCOPE,
                LocusEvent::ControlsMeetingBreakoutUpdated {
                    breakout: breakout.clone(),
                },
            );
        }

        if let (true, Some(interpretation)) =
            (updates.has_interpretation_changed, &current.interpretation)
        {
            pass.emit(
                SCOPE,
                LocusEvent::ControlsMeetingInterpretationUpdated {
                    interpretation: interpretation.clone(),
                },
            );
        }

        if let (true, Some(tone)) =
            (updates.has_entry_exit_tone_changed, &current.entry_exit_tone)
        {
            pass.update_meeting(MeetingUpdate {
                entry_exit_tone: Some(tone.clone()),
                ..Default::default()
            });
            pass.emit(
                SCOPE,
                LocusEvent::ControlsEntryExitToneUpdated {
                    entry_exit_tone: tone.clone(),
                },
            );
        }

        self.state.controls = Some(current);
    }

    fn on_full_state(&mut self, result: Reconciled<FullState, FullStateUpdates>, pass: &mut Pass) {
        const SCOPE: EventScope = scope("update_full_state");
        let Reconciled {
            previous,
            current,
            updates,
        } = result;

        pass.update_meeting(MeetingUpdate {
            meeting_state: current.state,
            meeting_type: current.kind,
            ..Default::default()
        });

        if let Some(current_state) = updates.meeting_state_changed_to {
            pass.emit(
                SCOPE,
                LocusEvent::FullStateMeetingStateChange {
                    previous_state: previous.and_then(|p| p.state),
                    current_state,
                },
            );
        }

        if let Some(meeting_type) = updates.meeting_type_changed_to {
            pass.emit(SCOPE, LocusEvent::FullStateTypeUpdate { meeting_type });
        }

        self.state.full_state = Some(current);
    }

    fn on_self(&mut self, result: Reconciled<SelfState, SelfUpdates>, pass: &mut Pass) {
        const SCOPE: EventScope = scope("update_self");
        let Reconciled {
            previous,
            current,
            updates,
        } = result;

        if let Some(state) = current.state {
            self.state.record_self_state(state);
        }

        if updates.layout_changed {
            pass.emit(
                SCOPE,
                LocusEvent::ControlsMeetingLayoutUpdated {
                    layout: current.layout.clone(),
                },
            );
        }
        if let (true, Some(sessions)) = (updates.breakouts_changed, &current.breakout_sessions) {
            pass.emit(
                SCOPE,
                LocusEvent::SelfMeetingBreakoutsChanged {
                    breakout_sessions: sessions.clone(),
                },
            );
        }
        if let (true, Some(interpretation)) =
            (updates.interpretation_changed, &current.interpretation)
        {
            pass.emit(
                SCOPE,
                LocusEvent::SelfMeetingInterpretationChanged {
                    interpretation: interpretation.clone(),
                    self_participant_id: current.self_id.clone(),
                },
            );
        }
        if updates.is_media_inactive_or_released {
            pass.emit(
                SCOPE,
                LocusEvent::DisconnectDueToInactivity {
                    reason: current.reason.clone(),
                },
            );
        }
        if updates.moderator_changed {
            pass.emit(
                SCOPE,
                LocusEvent::SelfModeratorChanged {
                    moderator: current.moderator,
                },
            );
        }
        if updates.is_roles_changed {
            pass.emit(
                SCOPE,
                LocusEvent::SelfRolesChanged {
                    old_roles: previous.as_ref().map(|p| p.roles.clone()),
                    new_roles: current.roles.clone(),
                },
            );
        }
        if updates.is_video_muted_by_others_changed {
            pass.emit(
                SCOPE,
                LocusEvent::SelfRemoteVideoMuteStatusUpdated {
                    muted: current.remote_video_muted,
                },
            );
        }
        if updates.local_audio_unmute_required_by_server {
            pass.emit(
                SCOPE,
                LocusEvent::LocalUnmuteRequired {
                    muted: current.remote_muted,
                    unmute_allowed: current.unmute_allowed,
                },
            );
        }
        if updates.is_muted_by_others_changed {
            pass.emit(
                SCOPE,
                LocusEvent::SelfRemoteMuteStatusUpdated {
                    muted: current.remote_muted,
                    unmute_allowed: current.unmute_allowed,
                },
            );
        }
        if updates.local_audio_unmute_requested_by_server {
            pass.emit(SCOPE, LocusEvent::LocalUnmuteRequested);
        }
        if updates.is_user_unadmitted {
            pass.emit(
                SCOPE,
                LocusEvent::SelfUnadmittedGuest {
                    self_id: current.self_id.clone(),
                },
            );
        }
        if updates.is_user_admitted {
            pass.emit(
                SCOPE,
                LocusEvent::SelfAdmittedGuest {
                    self_id: current.self_id.clone(),
                },
            );
        }
        if updates.is_media_inactive {
            pass.emit(
                SCOPE,
                LocusEvent::MediaInactivity {
                    status: current.current_media_status.clone(),
                },
            );
        }
        if updates.audio_state_change || updates.video_state_change || updates.share_state_change
        {
            let status = &current.current_media_status;
            pass.emit(
                SCOPE,
                LocusEvent::MediaStatusChange {
                    audio: status.audio.clone(),
                    video: status.video.clone(),
                    share: status.share.clone(),
                },
            );
        }
        if updates.is_user_observing {
            pass.emit(SCOPE, LocusEvent::SelfObserving);
        }
        if updates.can_not_view_the_participant_list_changed {
            pass.emit(
                SCOPE,
                LocusEvent::SelfCannotViewParticipantListChange {
                    can_not_view_the_participant_list: current.can_not_view_the_participant_list,
                },
            );
        }
        if updates.is_sharing_blocked_changed {
            pass.emit(
                SCOPE,
                LocusEvent::SelfIsSharingBlockedChange {
                    is_sharing_blocked: current.is_sharing_blocked,
                },
            );
        }

        pass.emit(
            SCOPE,
            LocusEvent::LocusInfoUpdateSelf {
                old_self: previous.map(Box::new),
                new_self: Box::new(current.clone()),
            },
        );

        self.state.self_state = Some(current);
    }

    fn on_host(&mut self, result: Reconciled<HostState, HostUpdates>, pass: &mut Pass) {
        let Reconciled {
            previous,
            current,
            updates,
        } = result;

        pass.update_meeting(MeetingUpdate {
            host_id: current.host_id.clone(),
            ..Default::default()
        });

        if updates.is_new_host {
            pass.emit(
                scope("update_host_info"),
                LocusEvent::LocusInfoUpdateHost {
                    new_host: current.clone(),
                    old_host: previous,
                },
            );
        }

        self.state.host = Some(current);
    }

    fn on_info(&mut self, result: Reconciled<InfoState, InfoUpdates>, pass: &mut Pass) {
        const SCOPE: EventScope = scope("update_meeting_info");
        let Reconciled { current, updates, .. } = result;

        if updates.is_locked {
            pass.emit(SCOPE, LocusEvent::MeetingLocked { info: current.clone() });
        }
        if updates.is_unlocked {
            pass.emit(SCOPE, LocusEvent::MeetingUnlocked { info: current.clone() });
        }

        let is_initializing = self.state.info.is_none();
        self.state.info = Some(current);
        pass.emit(SCOPE, LocusEvent::MeetingInfoUpdated { is_initializing });
    }

    fn on_media_shares(
        &mut self,
        result: Reconciled<MediaSharesState, MediaSharesUpdates>,
        pass: &mut Pass,
    ) {
        let Reconciled {
            previous,
            current,
            updates,
        } = result;

        if updates.changed {
            pass.emit(
                scope("update_media_shares"),
                LocusEvent::LocusInfoUpdateMediaShares {
                    current: current.clone(),
                    previous,
                },
            );
        }

        self.state.media_shares = Some(current);
    }

    fn on_embedded_apps(
        &mut self,
        result: Reconciled<Vec<EmbeddedApp>, EmbeddedAppsUpdates>,
        pass: &mut Pass,
    ) {
        let Reconciled { current, updates, .. } = result;

        if updates.changed {
            pass.emit(
                scope("update_embedded_apps"),
                LocusEvent::EmbeddedAppsUpdated {
                    apps: current.clone(),
                },
            );
        }

        self.state.embedded_apps = Some(current);
    }

    fn on_participants(
        &mut self,
        result: Reconciled<Vec<Participant>, RosterUpdates>,
        is_replace: bool,
        pass: &mut Pass,
    ) {
        let Reconciled { current, updates, .. } = result;

        let self_state = self.state.self_state.as_ref();
        pass.emit(
            scope("update_participants"),
            LocusEvent::LocusInfoUpdateParticipants {
                participants: current.clone(),
                deltas: updates.deltas,
                recording_id: self
                    .state
                    .controls
                    .as_ref()
                    .and_then(|c| c.recording_modified_by())
                    .map(str::to_string),
                self_identity: self_state.and_then(|s| s.self_identity.clone()),
                self_id: self_state.and_then(|s| s.self_id.clone()),
                host_id: self.state.host_id().map(str::to_string),
                is_replace,
            },
        );

        self.state.participants = current;
    }

    /// Host-assignment eligibility needs `self` and `host` from the same pass.
    fn compare_self_and_host(&self, pass: &mut Pass) {
        let Some(self_state) = self.state.self_state.as_ref() else {
            return;
        };
        let can_assign_host =
            self_state.self_identity.as_deref() == self.state.host_id() && self_state.moderator;

        pass.emit(
            scope("compare_self_and_host"),
            LocusEvent::LocusInfoCanAssignHost { can_assign_host },
        );
    }

    /// The locus carries it directly, except one-on-one spaces, where only
    /// `info` has it.
    fn update_conversation_url(&mut self, snapshot: &RawSnapshot, pass: &mut Pass) {
        let from_info = snapshot
            .info
            .as_ref()
            .and_then(|info| info.get("conversationUrl"))
            .and_then(Value::as_str);

        let url = match snapshot.conversation_url.as_deref() {
            Some(url) if self.state.conversation_url.as_deref() != Some(url) => url,
            _ => match from_info {
                Some(url) if self.state.conversation_url.as_deref() != Some(url) => url,
                _ => return,
            },
        };

        self.state.conversation_url = Some(url.to_string());
        pass.update_meeting(MeetingUpdate {
            conversation_url: Some(url.to_string()),
            ..Default::default()
        });
    }

    fn update_locus_url(&mut self, snapshot: &RawSnapshot, pass: &mut Pass) {
        let Some(url) = snapshot.url.as_ref() else {
            return;
        };
        if self.state.url.as_ref() == Some(url) {
            return;
        }

        self.state.url = Some(url.clone());
        pass.update_meeting(MeetingUpdate {
            locus_url: Some(url.clone()),
            ..Default::default()
        });
        pass.emit(
            scope("update_locus_url"),
            LocusEvent::LocusInfoUpdateUrl { url: url.clone() },
        );
    }

    fn update_services(&mut self, snapshot: &RawSnapshot, pass: &mut Pass) {
        let Some(raw) = snapshot.services() else {
            return;
        };
        let services: ServiceLinks = match serde_json::from_value(raw.clone()) {
            Ok(services) => services,
            Err(e) => {
                warn!(error = %e, "ignoring malformed links.services");
                return;
            }
        };
        if self.state.services.as_ref() == Some(&services) {
            return;
        }

        self.state.services = Some(services.clone());
        pass.emit(scope("update_services"), LocusEvent::LinksServices { services });
    }

    fn update_partner(&mut self, pass: &mut Pass) {
        if !self.state.is_call() {
            return;
        }

        let found =
            roster::find_partner(&self.state.participants, self.state.self_identity()).cloned();
        let Some(partner) = found.or_else(|| self.state.partner.clone()) else {
            return;
        };

        if self.state.partner.as_ref() != Some(&partner) {
            pass.update_meeting(MeetingUpdate {
                partner: Some(partner.clone()),
                ..Default::default()
            });
            self.state.partner = Some(partner);
        }
    }

    /// Calls dial the partner; meetings use the info SIP URI.
    fn update_sip_uri(&mut self, pass: &mut Pass) {
        let sip_uri = if self.state.is_call() {
            self.state
                .partner
                .as_ref()
                .and_then(|p| p.person.sip_url.clone().or_else(|| p.person.id.clone()))
        } else {
            self.state.info.as_ref().and_then(|i| i.sip_uri.clone())
        };

        let Some(sip_uri) = sip_uri else {
            return;
        };
        if self.state.sip_uri.as_ref() == Some(&sip_uri) {
            return;
        }

        self.state.sip_uri = Some(sip_uri.clone());
        pass.update_meeting(MeetingUpdate {
            sip_uri: Some(sip_uri),
            ..Default::default()
        });
    }

    fn check_liveness(&self, pass: &mut Pass) -> Option<Teardown> {
        let teardown = liveness::check(LivenessInput {
            full_state: self.state.full_state.as_ref(),
            self_state: self.state.self_state.as_ref(),
            partner: self.state.partner.as_ref(),
        })?;

        warn!(
            reason = ?teardown.reason,
            should_leave = teardown.should_leave,
            "destroying meeting"
        );
        pass.emit(
            EventScope::new("liveness", "is_meeting_active"),
            LocusEvent::DestroyMeeting {
                reason: teardown.reason,
                should_leave: teardown.should_leave,
            },
        );

        Some(teardown)
    }

    /// Ringing stops on the caller's side once the callee answers or declines.
    fn handle_one_on_one_event(&self, snapshot: &RawSnapshot, pass: &mut Pass) {
        if !self.state.is_call() {
            return;
        }

        let response = match snapshot.event_type.as_deref() {
            Some(EVENT_PARTICIPANT_DECLINED) => RemoteResponse::Declined,
            Some(EVENT_PARTICIPANT_JOIN) => RemoteResponse::Answered,
            _ => return,
        };

        pass.emit(
            scope("handle_one_on_one_event"),
            LocusEvent::RemoteResponse { response },
        );
    }
}
