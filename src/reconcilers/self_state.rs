//! Reconciler for `self`: the local participant's own meeting state.

use super::{decode, require_current, ReconcileContext, Reconciled};
use crate::error::{LocusError, Result};
use crate::types::{Domain, ParticipantState, SELF_REASON_MOVED};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device type used for dial-in phone legs.
const PSTN_DEVICE_TYPE: &str = "PROVISIONAL";

/// Media session state and direction value meaning "inactive".
const MEDIA_INACTIVE: &str = "inactive";

/// Device intent types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    Join,
    Wait,
    MoveMedia,
    Observe,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub kind: Option<IntentType>,
}

/// One media session of a device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSession {
    pub media_type: Option<String>,
    pub media_content: Option<String>,
    pub state: Option<String>,
    pub direction: Option<String>,
}

impl MediaSession {
    fn is_inactive(&self) -> bool {
        self.state.as_deref() == Some(MEDIA_INACTIVE)
    }
}

/// A device the local user is (or was) connected with.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub url: Option<String>,
    pub device_type: Option<String>,
    pub state: Option<ParticipantState>,
    pub reason: Option<String>,
    pub intent: Option<Intent>,
    #[serde(default)]
    pub media_sessions: Vec<MediaSession>,
}

impl Device {
    fn intent_type(&self) -> Option<IntentType> {
        self.intent.as_ref().and_then(|intent| intent.kind)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    audio_status: Option<String>,
    video_status: Option<String>,
    video_slides_status: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    last_modified: Option<String>,
    modified_by: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioControls {
    muted: Option<bool>,
    disallow_unmute: Option<bool>,
    #[serde(default)]
    requested_to_unmute: bool,
    #[serde(default)]
    local_audio_unmute_required: bool,
    meta: Option<Meta>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct VideoControls {
    muted: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Role {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    has_role: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RoleControls {
    #[serde(default)]
    roles: Vec<Role>,
}

#[derive(Clone, Debug, Deserialize)]
struct Layout {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct BreakoutControls {
    sessions: Option<Value>,
}

/// Simultaneous interpretation settings of the local user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfInterpretation {
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub order: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct SelfControls {
    audio: Option<AudioControls>,
    video: Option<VideoControls>,
    role: Option<RoleControls>,
    layouts: Option<Vec<Layout>>,
    breakout: Option<BreakoutControls>,
    interpretation: Option<SelfInterpretation>,
}

/// `self` as it arrives on the wire.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelfPayload {
    id: Option<String>,
    url: Option<String>,
    state: Option<ParticipantState>,
    reason: Option<String>,
    person: Option<Person>,
    #[serde(default)]
    guest: bool,
    #[serde(default)]
    moderator: bool,
    #[serde(default)]
    is_creator: bool,
    #[serde(default)]
    removed: bool,
    #[serde(default)]
    devices: Vec<Device>,
    status: Option<Status>,
    controls: Option<SelfControls>,
    #[serde(default)]
    can_not_view_the_participant_list: bool,
    #[serde(default)]
    is_sharing_blocked: bool,
}

/// Cumulative media status across all devices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStatusSummary {
    pub audio: Option<String>,
    pub video: Option<String>,
    pub slides: Option<String>,
}

/// Media sessions of the device this client joined with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStatus {
    pub audio: Option<MediaSession>,
    pub video: Option<MediaSession>,
    pub share: Option<MediaSession>,
}

impl MediaStatus {
    /// Pick main audio, main video and slides out of a device's sessions.
    pub fn from_sessions(sessions: &[MediaSession]) -> Self {
        let find = |media_type: &str, content: &str| {
            sessions
                .iter()
                .find(|s| {
                    s.media_type.as_deref() == Some(media_type)
                        && s.media_content.as_deref() == Some(content)
                })
                .cloned()
        };

        Self {
            audio: find("AUDIO", "main"),
            video: find("VIDEO", "main"),
            share: find("VIDEO", "slides"),
        }
    }
}

/// Parsed view of the local participant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfState {
    pub self_id: Option<String>,
    pub self_url: Option<String>,
    pub self_identity: Option<String>,
    pub state: Option<ParticipantState>,
    pub reason: Option<String>,
    /// `None` when the server did not send audio controls.
    pub remote_muted: Option<bool>,
    pub unmute_allowed: Option<bool>,
    pub remote_video_muted: Option<bool>,
    pub local_audio_unmute_requested: bool,
    pub local_audio_unmute_required: bool,
    pub last_modified: Option<String>,
    pub modified_by: Option<String>,
    pub guest: bool,
    pub moderator: bool,
    pub creator: bool,
    pub removed: bool,
    pub media_status: MediaStatusSummary,
    pub joined_with: Option<Device>,
    pub pstn_devices: Vec<Device>,
    pub current_media_status: MediaStatus,
    pub roles: Vec<String>,
    pub layout: Option<String>,
    /// Breakout sessions offered to the user, as sent.
    pub breakout_sessions: Option<Value>,
    pub interpretation: Option<SelfInterpretation>,
    pub is_user_unadmitted: bool,
    pub can_not_view_the_participant_list: bool,
    pub is_sharing_blocked: bool,
}

impl SelfState {
    pub fn is_joined(&self) -> bool {
        self.state == Some(ParticipantState::Joined)
    }

    fn joined_intent(&self) -> Option<IntentType> {
        self.joined_with.as_ref().and_then(Device::intent_type)
    }

    /// Waiting in the lobby.
    pub fn is_locus_user_unadmitted(&self) -> bool {
        self.joined_intent() == Some(IntentType::Wait) && self.state == Some(ParticipantState::Idle)
    }

    /// Joined with an intent other than waiting.
    pub fn is_locus_user_admitted(&self) -> bool {
        self.joined_intent() != Some(IntentType::Wait)
            && self.state == Some(ParticipantState::Joined)
    }

    /// The raw `reason`/`state` pair the server sends when moving the user
    /// into a breakout session.
    pub fn is_moved(&self) -> bool {
        self.reason.as_deref() == Some(SELF_REASON_MOVED)
            && self.state == Some(ParticipantState::Left)
    }
}

/// Transitions detected on `self`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelfUpdates {
    pub is_user_unadmitted: bool,
    pub is_user_admitted: bool,
    pub is_muted_by_others_changed: bool,
    pub is_video_muted_by_others_changed: bool,
    pub local_audio_unmute_requested_by_server: bool,
    pub local_audio_unmute_required_by_server: bool,
    pub moderator_changed: bool,
    pub is_media_inactive_or_released: bool,
    pub is_user_observing: bool,
    pub layout_changed: bool,
    pub is_roles_changed: bool,
    pub is_media_inactive: bool,
    pub audio_state_change: bool,
    pub video_state_change: bool,
    pub share_state_change: bool,
    pub can_not_view_the_participant_list_changed: bool,
    pub is_sharing_blocked_changed: bool,
    pub breakouts_changed: bool,
    pub interpretation_changed: bool,
}

/// Decode and parse a raw `self`.
pub fn parse(raw: &Value, ctx: &ReconcileContext<'_>) -> Result<SelfState> {
    let payload: SelfPayload = decode(Domain::Self_, raw)?;

    let joined_with = ctx.device_url.and_then(|device_url| {
        payload
            .devices
            .iter()
            .find(|device| device.url.as_deref() == Some(device_url))
            .cloned()
    });
    let pstn_devices = payload
        .devices
        .iter()
        .filter(|device| device.device_type.as_deref() == Some(PSTN_DEVICE_TYPE))
        .cloned()
        .collect();

    let controls = payload.controls.unwrap_or_default();
    let audio = controls.audio;
    let meta = audio.as_ref().and_then(|a| a.meta.as_ref());
    let status = payload.status.unwrap_or_default();

    let roles = controls
        .role
        .map(|role| {
            role.roles
                .into_iter()
                .filter(|r| r.has_role)
                .map(|r| r.kind)
                .collect()
        })
        .unwrap_or_default();

    let current_media_status = joined_with
        .as_ref()
        .map(|device: &Device| MediaStatus::from_sessions(&device.media_sessions))
        .unwrap_or_default();

    let mut parsed = SelfState {
        self_id: payload.id,
        self_url: payload.url,
        self_identity: payload.person.and_then(|p| p.id),
        state: payload.state,
        reason: payload.reason,
        remote_muted: audio.as_ref().and_then(|a| a.muted),
        unmute_allowed: audio.as_ref().map(|a| !a.disallow_unmute.unwrap_or(false)),
        remote_video_muted: controls.video.and_then(|v| v.muted),
        local_audio_unmute_requested: audio.as_ref().is_some_and(|a| a.requested_to_unmute),
        local_audio_unmute_required: audio.as_ref().is_some_and(|a| a.local_audio_unmute_required),
        last_modified: meta.and_then(|m| m.last_modified.clone()),
        modified_by: meta.and_then(|m| m.modified_by.clone()),
        guest: payload.guest,
        moderator: payload.moderator,
        creator: payload.is_creator,
        removed: payload.removed,
        media_status: MediaStatusSummary {
            audio: status.audio_status,
            video: status.video_status,
            slides: status.video_slides_status,
        },
        joined_with,
        pstn_devices,
        current_media_status,
        roles,
        layout: controls
            .layouts
            .and_then(|layouts| layouts.into_iter().next())
            .and_then(|layout| layout.kind),
        breakout_sessions: controls.breakout.and_then(|b| b.sessions),
        interpretation: controls.interpretation,
        is_user_unadmitted: false,
        can_not_view_the_participant_list: payload.can_not_view_the_participant_list,
        is_sharing_blocked: payload.is_sharing_blocked,
    };
    parsed.is_user_unadmitted = parsed.is_locus_user_unadmitted();

    Ok(parsed)
}

fn missing(what: &str) -> LocusError {
    LocusError::Parameter(format!("new self must be defined to determine {}", what))
}

pub fn is_user_unadmitted(current: Option<&SelfState>) -> Result<bool> {
    let current = current.ok_or_else(|| missing("if self is unadmitted as guest"))?;
    Ok(current.is_locus_user_unadmitted())
}

/// Lobby to meeting. A missing previous self could not have been admitted yet.
pub fn is_user_admitted(previous: Option<&SelfState>, current: Option<&SelfState>) -> Result<bool> {
    let Some(previous) = previous else {
        return Ok(false);
    };
    let current = current.ok_or_else(|| missing("if self transitioned to admitted as guest"))?;
    Ok(previous.is_locus_user_unadmitted() && current.is_locus_user_admitted())
}

/// A missing previous self always counts as a change.
pub fn moderator_changed(
    previous: Option<&SelfState>,
    current: Option<&SelfState>,
) -> Result<bool> {
    let Some(previous) = previous else {
        return Ok(true);
    };
    let current = current.ok_or_else(|| missing("if self transitioned moderator status"))?;
    Ok(previous.moderator != current.moderator)
}

/// Remote audio mute changed. The first value seen on join only counts when
/// it is already muted (mute on entry).
pub fn muted_by_others_changed(
    previous: Option<&SelfState>,
    current: Option<&SelfState>,
) -> Result<bool> {
    let current = current.ok_or_else(|| missing("if self was muted by others"))?;

    let Some(previous_muted) = previous.and_then(|p| p.remote_muted) else {
        return Ok(current.remote_muted == Some(true));
    };
    let Some(current_muted) = current.remote_muted else {
        return Ok(false);
    };
    let unmute_allowed_changed = previous.map(|p| p.unmute_allowed) != Some(current.unmute_allowed);

    Ok(previous_muted != current_muted || (current_muted && unmute_allowed_changed))
}

/// Same rule as audio, over the video mute flag.
pub fn video_muted_by_others_changed(
    previous: Option<&SelfState>,
    current: Option<&SelfState>,
) -> Result<bool> {
    let current = current.ok_or_else(|| missing("if self video was muted by others"))?;

    match (previous.and_then(|p| p.remote_video_muted), current.remote_video_muted) {
        (None, current_muted) => Ok(current_muted == Some(true)),
        (Some(_), None) => Ok(false),
        (Some(previous_muted), Some(current_muted)) => Ok(previous_muted != current_muted),
    }
}

pub fn local_audio_unmute_requested_by_server(
    previous: Option<&SelfState>,
    current: Option<&SelfState>,
) -> Result<bool> {
    let current = current.ok_or_else(|| missing("if self received request to unmute"))?;
    let previously_requested = previous.is_some_and(|p| p.local_audio_unmute_requested);
    Ok(current.local_audio_unmute_requested && !previously_requested)
}

pub fn local_audio_unmute_required_by_server(
    previous: Option<&SelfState>,
    current: Option<&SelfState>,
) -> Result<bool> {
    let current = current.ok_or_else(|| missing("if localAudioUnmuteRequired changed"))?;
    let flag_changed = previous.map(|p| p.local_audio_unmute_required)
        != Some(current.local_audio_unmute_required);
    Ok(current.remote_muted != Some(true) && current.local_audio_unmute_required && flag_changed)
}

/// Breakout move id recorded on the device this client joined with, when
/// that join replaced a device in another session.
pub fn replaced_breakout_move_id(raw: &Value, device_url: Option<&str>) -> Option<String> {
    let device_url = device_url?;
    raw.get("devices")?
        .as_array()?
        .iter()
        .find(|device| device.get("url").and_then(Value::as_str) == Some(device_url))?
        .get("replaces")?
        .get(0)?
        .get("breakoutMoveId")?
        .as_str()
        .map(str::to_string)
}

/// The joined device went from JOINED to LEFT because of inactivity or a
/// media release.
pub fn was_media_inactive_or_released(previous: Option<&SelfState>, current: &SelfState) -> bool {
    let previous_joined = previous
        .and_then(|p| p.joined_with.as_ref())
        .is_some_and(|device| device.state == Some(ParticipantState::Joined));

    let Some(device) = current.joined_with.as_ref() else {
        return false;
    };

    previous_joined
        && device.state == Some(ParticipantState::Left)
        && matches!(device.reason.as_deref(), Some("INACTIVE") | Some("MEDIA_RELEASED"))
}

/// Device intent went MOVE_MEDIA -> OBSERVE.
pub fn is_device_observing(previous: Option<&SelfState>, current: &SelfState) -> bool {
    previous.and_then(SelfState::joined_intent) == Some(IntentType::MoveMedia)
        && current.joined_intent() == Some(IntentType::Observe)
}

pub fn layout_changed(previous: Option<&SelfState>, current: &SelfState) -> bool {
    current.layout.is_some() && previous.and_then(|p| p.layout.as_ref()) != current.layout.as_ref()
}

pub fn breakouts_changed(previous: Option<&SelfState>, current: &SelfState) -> bool {
    current.breakout_sessions.is_some()
        && previous.and_then(|p| p.breakout_sessions.as_ref()) != current.breakout_sessions.as_ref()
}

pub fn interpretation_changed(previous: Option<&SelfState>, current: &SelfState) -> bool {
    current.interpretation.is_some()
        && previous.and_then(|p| p.interpretation.as_ref()) != current.interpretation.as_ref()
}

pub fn roles_changed(previous: Option<&SelfState>, current: &SelfState) -> bool {
    previous.map(|p| &p.roles) != Some(&current.roles)
}

fn entered_inactive(previous: Option<&MediaSession>, current: Option<&MediaSession>) -> bool {
    match (previous, current) {
        (Some(previous), Some(current)) => {
            !previous.is_inactive()
                && current.is_inactive()
                && current.direction.as_deref() != Some(MEDIA_INACTIVE)
        }
        _ => false,
    }
}

/// A media session of the joined device went inactive while its direction
/// did not. Needs both a previous and a current joined device.
pub fn is_media_inactive(previous: Option<&SelfState>, current: &SelfState) -> bool {
    let (Some(previous_device), Some(current_device)) = (
        previous.and_then(|p| p.joined_with.as_ref()),
        current.joined_with.as_ref(),
    ) else {
        return false;
    };

    let before = MediaStatus::from_sessions(&previous_device.media_sessions);
    let after = MediaStatus::from_sessions(&current_device.media_sessions);

    entered_inactive(before.audio.as_ref(), after.audio.as_ref())
        || entered_inactive(before.video.as_ref(), after.video.as_ref())
        || entered_inactive(before.share.as_ref(), after.share.as_ref())
}

/// Reconcile `self`.
pub fn reconcile(
    old_raw: Option<&Value>,
    new_raw: Option<&Value>,
    ctx: &ReconcileContext<'_>,
) -> Result<Reconciled<SelfState, SelfUpdates>> {
    let current = parse(require_current(Domain::Self_, new_raw)?, ctx)?;
    let previous = old_raw.map(|raw| parse(raw, ctx)).transpose()?;
    let prev = previous.as_ref();
    let cur = Some(&current);

    let before = prev.map(|p| &p.current_media_status);
    let after = &current.current_media_status;

    let updates = SelfUpdates {
        is_user_unadmitted: is_user_unadmitted(cur)?,
        is_user_admitted: is_user_admitted(prev, cur)?,
        is_muted_by_others_changed: muted_by_others_changed(prev, cur)?,
        is_video_muted_by_others_changed: video_muted_by_others_changed(prev, cur)?,
        local_audio_unmute_requested_by_server: local_audio_unmute_requested_by_server(prev, cur)?,
        local_audio_unmute_required_by_server: local_audio_unmute_required_by_server(prev, cur)?,
        moderator_changed: moderator_changed(prev, cur)?,
        is_media_inactive_or_released: was_media_inactive_or_released(prev, &current),
        is_user_observing: is_device_observing(prev, &current),
        layout_changed: layout_changed(prev, &current),
        is_roles_changed: roles_changed(prev, &current),
        is_media_inactive: is_media_inactive(prev, &current),
        audio_state_change: before.and_then(|m| m.audio.as_ref()) != after.audio.as_ref(),
        video_state_change: before.and_then(|m| m.video.as_ref()) != after.video.as_ref(),
        share_state_change: before.and_then(|m| m.share.as_ref()) != after.share.as_ref(),
        can_not_view_the_participant_list_changed: prev
            .map(|p| p.can_not_view_the_participant_list)
            != Some(current.can_not_view_the_participant_list),
        is_sharing_blocked_changed: prev.map(|p| p.is_sharing_blocked)
            != Some(current.is_sharing_blocked),
        breakouts_changed: breakouts_changed(prev, &current),
        interpretation_changed: interpretation_changed(prev, &current),
    };

    Ok(Reconciled {
        previous,
        current,
        updates,
    })
}
