//! Reconciler for `controls`: meeting-wide switches (recording,
//! transcription, mute-on-entry, reactions, ...).

use super::{decode, require_current, ReconcileContext, Reconciled};
use crate::error::Result;
use crate::types::Domain;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recording lifecycle as presented to the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordingState {
    Idle,
    Recording,
    Paused,
    Resumed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMeta {
    pub last_modified: Option<String>,
    pub modified_by: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub meta: ControlMeta,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingContainer {
    pub meeting_container_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcribe {
    #[serde(default)]
    pub transcribing: bool,
    #[serde(default)]
    pub caption: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCaption {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryExitTone {
    #[serde(default)]
    pub enabled: bool,
    pub mode: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reactions {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub show_display_name_with_reactions: bool,
}

/// Breakout session a locus belongs to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakout {
    pub group_id: Option<String>,
    pub session_id: Option<String>,
    pub session_type: Option<String>,
    /// Move id of the device this join replaced, taken from `self`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakout_move_id: Option<String>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, Value>,
}

impl Breakout {
    /// Both sides name the same group and session.
    pub fn same_session(&self, other: &Breakout) -> bool {
        self.group_id == other.group_id && self.session_id == other.session_id
    }
}

/// `controls` as sent by the server. Sub-controls the server omits stay
/// `None` and never report a change.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsState {
    pub record: Option<Record>,
    pub meeting_container: Option<MeetingContainer>,
    pub transcribe: Option<Transcribe>,
    pub manual_caption_control: Option<ManualCaption>,
    pub entry_exit_tone: Option<EntryExitTone>,
    pub mute_on_entry: Option<Value>,
    pub share_control: Option<Value>,
    pub disallow_unmute: Option<Value>,
    pub reactions: Option<Reactions>,
    pub view_the_participant_list: Option<Value>,
    pub raise_hand: Option<Value>,
    pub video: Option<Value>,
    pub breakout: Option<Breakout>,
    pub interpretation: Option<Value>,
}

impl ControlsState {
    /// Who last touched the recording, if known.
    pub fn recording_modified_by(&self) -> Option<&str> {
        self.record.as_ref().and_then(|r| r.meta.modified_by.as_deref())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlsUpdates {
    pub has_recording_changed: bool,
    pub has_recording_paused_changed: bool,
    pub has_meeting_container_changed: bool,
    pub has_transcribe_changed: bool,
    pub has_manual_caption_changed: bool,
    pub has_entry_exit_tone_changed: bool,
    pub has_mute_on_entry_changed: bool,
    pub has_share_control_changed: bool,
    pub has_disallow_unmute_changed: bool,
    pub has_reactions_changed: bool,
    pub has_reaction_display_names_changed: bool,
    pub has_view_the_participant_list_changed: bool,
    pub has_raise_hand_changed: bool,
    pub has_video_changed: bool,
    pub has_breakout_changed: bool,
    pub has_interpretation_changed: bool,
}

impl ControlsUpdates {
    pub fn any_recording_change(&self) -> bool {
        self.has_recording_changed || self.has_recording_paused_changed
    }
}

/// A present sub-control that differs from the previous one (or has no
/// previous counterpart).
fn changed<T: PartialEq>(
    previous: Option<&ControlsState>,
    current: &Option<T>,
    pick: fn(&ControlsState) -> &Option<T>,
) -> bool {
    match current {
        Some(current) => previous.and_then(|p| pick(p).as_ref()) != Some(current),
        None => false,
    }
}

/// Recording state for a pass. A pause-flag change takes precedence over a
/// recording-flag change; `None` when neither changed.
pub fn recording_state(
    current: &ControlsState,
    updates: &ControlsUpdates,
) -> Option<RecordingState> {
    let record = current.record.as_ref()?;

    if updates.has_recording_paused_changed {
        Some(if record.paused {
            RecordingState::Paused
        } else if record.recording {
            RecordingState::Resumed
        } else {
            RecordingState::Idle
        })
    } else if updates.has_recording_changed {
        Some(if record.recording {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        })
    } else {
        None
    }
}

/// The locus switched to another breakout session, so the member list is a
/// replacement rather than an update. Needs a breakout on both sides.
pub fn is_need_replace_members(previous: Option<&ControlsState>, current: &ControlsState) -> bool {
    match (previous.and_then(|p| p.breakout.as_ref()), current.breakout.as_ref()) {
        (Some(previous), Some(current)) => !previous.same_session(current),
        _ => false,
    }
}

pub fn reconcile(
    old_raw: Option<&Value>,
    new_raw: Option<&Value>,
    _ctx: &ReconcileContext<'_>,
) -> Result<Reconciled<ControlsState, ControlsUpdates>> {
    let current: ControlsState =
        decode(Domain::Controls, require_current(Domain::Controls, new_raw)?)?;
    let previous: Option<ControlsState> = old_raw
        .map(|raw| decode(Domain::Controls, raw))
        .transpose()?;
    let prev = previous.as_ref();

    let previous_record = prev.and_then(|p| p.record.as_ref());
    let previous_reactions = prev.and_then(|p| p.reactions.as_ref());

    let updates = ControlsUpdates {
        has_recording_changed: current
            .record
            .as_ref()
            .is_some_and(|r| previous_record.map(|p| p.recording) != Some(r.recording)),
        has_recording_paused_changed: current
            .record
            .as_ref()
            .is_some_and(|r| previous_record.map(|p| p.paused) != Some(r.paused)),
        has_meeting_container_changed: changed(prev, &current.meeting_container, |c| {
            &c.meeting_container
        }),
        has_transcribe_changed: changed(prev, &current.transcribe, |c| &c.transcribe),
        has_manual_caption_changed: changed(prev, &current.manual_caption_control, |c| {
            &c.manual_caption_control
        }),
        has_entry_exit_tone_changed: changed(prev, &current.entry_exit_tone, |c| {
            &c.entry_exit_tone
        }),
        has_mute_on_entry_changed: changed(prev, &current.mute_on_entry, |c| &c.mute_on_entry),
        has_share_control_changed: changed(prev, &current.share_control, |c| &c.share_control),
        has_disallow_unmute_changed: changed(prev, &current.disallow_unmute, |c| {
            &c.disallow_unmute
        }),
        has_reactions_changed: current
            .reactions
            .as_ref()
            .is_some_and(|r| previous_reactions.map(|p| p.enabled) != Some(r.enabled)),
        has_reaction_display_names_changed: current.reactions.as_ref().is_some_and(|r| {
            previous_reactions.map(|p| p.show_display_name_with_reactions)
                != Some(r.show_display_name_with_reactions)
        }),
        has_view_the_participant_list_changed: changed(
            prev,
            &current.view_the_participant_list,
            |c| &c.view_the_participant_list,
        ),
        has_raise_hand_changed: changed(prev, &current.raise_hand, |c| &c.raise_hand),
        has_video_changed: changed(prev, &current.video, |c| &c.video),
        has_breakout_changed: changed(prev, &current.breakout, |c| &c.breakout),
        has_interpretation_changed: changed(prev, &current.interpretation, |c| {
            &c.interpretation
        }),
    };

    Ok(Reconciled {
        previous,
        current,
        updates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(recording: bool, paused: bool) -> Value {
        json!({
            "record": {"recording": recording, "paused": paused, "meta": {"modifiedBy": "user-1"}}
        })
    }

    fn run(old: Option<&Value>, new: &Value) -> Reconciled<ControlsState, ControlsUpdates> {
        reconcile(old, Some(new), &ReconcileContext::default()).unwrap()
    }

    #[test]
    fn test_recording_started() {
        let result = run(Some(&record(false, false)), &record(true, false));
        assert!(result.updates.has_recording_changed);
        assert!(!result.updates.has_recording_paused_changed);
        assert_eq!(
            recording_state(&result.current, &result.updates),
            Some(RecordingState::Recording)
        );
        assert_eq!(result.current.recording_modified_by(), Some("user-1"));
    }

    #[test]
    fn test_pause_takes_precedence() {
        // Recording and pause flipped in the same snapshot.
        let result = run(Some(&record(false, false)), &record(true, true));
        assert!(result.updates.has_recording_changed);
        assert!(result.updates.has_recording_paused_changed);
        assert_eq!(
            recording_state(&result.current, &result.updates),
            Some(RecordingState::Paused)
        );
    }

    #[test]
    fn test_resume_and_stop_while_paused() {
        let resumed = run(Some(&record(true, true)), &record(true, false));
        assert_eq!(
            recording_state(&resumed.current, &resumed.updates),
            Some(RecordingState::Resumed)
        );

        let stopped = run(Some(&record(true, true)), &record(false, false));
        assert_eq!(
            recording_state(&stopped.current, &stopped.updates),
            Some(RecordingState::Idle)
        );
    }

    #[test]
    fn test_unchanged_record_has_no_state() {
        let result = run(Some(&record(true, false)), &record(true, false));
        assert!(!result.updates.any_recording_change());
        assert_eq!(recording_state(&result.current, &result.updates), None);
    }

    #[test]
    fn test_sub_controls() {
        let old = json!({
            "muteOnEntry": {"enabled": false},
            "transcribe": {"transcribing": false, "caption": false},
            "reactions": {"enabled": true, "showDisplayNameWithReactions": false}
        });
        let new = json!({
            "muteOnEntry": {"enabled": true},
            "transcribe": {"transcribing": false, "caption": false},
            "reactions": {"enabled": true, "showDisplayNameWithReactions": true},
            "entryExitTone": {"enabled": true, "mode": "beep"}
        });

        let updates = run(Some(&old), &new).updates;
        assert!(updates.has_mute_on_entry_changed);
        assert!(!updates.has_transcribe_changed);
        assert!(!updates.has_reactions_changed);
        assert!(updates.has_reaction_display_names_changed);
        assert!(updates.has_entry_exit_tone_changed);
        assert!(!updates.has_raise_hand_changed);
    }

    #[test]
    fn test_breakout_session_switch() {
        let main = json!({
            "breakout": {"groupId": "g-1", "sessionId": "main", "sessionType": "MAIN"}
        });
        let room = json!({
            "breakout": {"groupId": "g-1", "sessionId": "room-2", "sessionType": "BREAKOUT"}
        });

        let result = run(Some(&main), &room);
        assert!(result.updates.has_breakout_changed);
        assert!(is_need_replace_members(result.previous.as_ref(), &result.current));
        let breakout = result.current.breakout.as_ref().unwrap();
        assert_eq!(breakout.session_type.as_deref(), Some("BREAKOUT"));

        // Same session, other fields moved: an update, not a replacement.
        let mut renamed = room.clone();
        renamed["breakout"]["name"] = json!("Room 2");
        let result = run(Some(&room), &renamed);
        assert!(result.updates.has_breakout_changed);
        assert!(!is_need_replace_members(result.previous.as_ref(), &result.current));

        // First breakout seen: nothing to replace yet.
        let result = run(None, &room);
        assert!(!is_need_replace_members(result.previous.as_ref(), &result.current));
    }

    #[test]
    fn test_interpretation_languages() {
        let before = json!({"interpretation": {"siLanguages": [{"languageCode": 20}]}});
        let after = json!({
            "interpretation": {"siLanguages": [{"languageCode": 20}, {"languageCode": 24}]}
        });

        assert!(run(Some(&before), &after).updates.has_interpretation_changed);
        assert!(!run(Some(&after), &after).updates.has_interpretation_changed);
        assert!(!run(None, &json!({})).updates.has_interpretation_changed);
    }

    #[test]
    fn test_malformed_controls() {
        let ctx = ReconcileContext::default();
        let result = reconcile(None, Some(&json!({"record": "yes"})), &ctx);
        assert!(matches!(
            result,
            Err(crate::error::LocusError::Decode { domain: Domain::Controls, .. })
        ));
    }
}
