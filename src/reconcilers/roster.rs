//! Reconciler for `participants`.

use super::{decode, require_current, ReconcileContext, Reconciled};
use crate::error::Result;
use crate::types::{Domain, ParticipantState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARTICIPANT_TYPE_USER: &str = "USER";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: Option<String>,
    pub name: Option<String>,
    pub sip_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStatus {
    pub audio_status: Option<String>,
    pub video_status: Option<String>,
    pub video_slides_status: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Option<String>,
    pub identity: Option<String>,
    #[serde(default)]
    pub person: Person,
    pub state: Option<ParticipantState>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub status: ParticipantStatus,
}

impl Participant {
    pub fn is_user(&self) -> bool {
        self.kind.as_deref() == Some(PARTICIPANT_TYPE_USER)
    }
}

/// Which media statuses of a participant changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDelta {
    pub audio_status: bool,
    pub video_status: bool,
    pub video_slides_status: bool,
}

impl StatusDelta {
    fn between(previous: &ParticipantStatus, current: &ParticipantStatus) -> Self {
        Self {
            audio_status: previous.audio_status != current.audio_status,
            video_status: previous.video_status != current.video_status,
            video_slides_status: previous.video_slides_status != current.video_slides_status,
        }
    }

    pub fn any(&self) -> bool {
        self.audio_status || self.video_status || self.video_slides_status
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDelta {
    pub person: Person,
    pub delta: StatusDelta,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RosterUpdates {
    /// Participants whose media status changed, matched by person id.
    pub deltas: Vec<ParticipantDelta>,
}

/// Media status deltas of `current` against `previous`. Participants that
/// were not known before are compared against an empty status.
pub fn participant_deltas(
    previous: &[Participant],
    current: &[Participant],
) -> Vec<ParticipantDelta> {
    let empty = ParticipantStatus::default();

    current
        .iter()
        .filter_map(|participant| {
            let before = previous
                .iter()
                .find(|p| p.person.id.is_some() && p.person.id == participant.person.id)
                .map_or(&empty, |p| &p.status);
            let delta = StatusDelta::between(before, &participant.status);

            delta.any().then(|| ParticipantDelta {
                person: participant.person.clone(),
                delta,
            })
        })
        .collect()
}

/// The other side of a call: the participant whose identity is not ours.
/// With more than two participants only non-removed users qualify. Without
/// a known self identity there is no telling us apart, so nothing matches.
pub fn find_partner<'p>(
    participants: &'p [Participant],
    self_identity: Option<&str>,
) -> Option<&'p Participant> {
    let self_identity = self_identity?;
    participants.iter().find(|participant| {
        participant.identity.as_deref() != Some(self_identity)
            && (participants.len() <= 2 || (participant.is_user() && !participant.removed))
    })
}

pub fn reconcile(
    old_raw: Option<&Value>,
    new_raw: Option<&Value>,
    _ctx: &ReconcileContext<'_>,
) -> Result<Reconciled<Vec<Participant>, RosterUpdates>> {
    let current: Vec<Participant> =
        decode(Domain::Participants, require_current(Domain::Participants, new_raw)?)?;
    let previous: Option<Vec<Participant>> = old_raw
        .map(|raw| decode(Domain::Participants, raw))
        .transpose()?;

    let updates = RosterUpdates {
        deltas: participant_deltas(previous.as_deref().unwrap_or_default(), &current),
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

    fn participant(id: &str, identity: &str, state: &str, audio: &str) -> Value {
        json!({
            "id": id,
            "identity": identity,
            "person": {"id": identity, "name": identity},
            "state": state,
            "type": "USER",
            "status": {"audioStatus": audio, "videoStatus": "SENDRECV"}
        })
    }

    fn parsed(value: Value) -> Vec<Participant> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_status_deltas() {
        let ctx = ReconcileContext::default();
        let before = json!([
            participant("1", "alice", "JOINED", "SENDRECV"),
            participant("2", "bob", "JOINED", "SENDRECV")
        ]);
        let after = json!([
            participant("1", "alice", "JOINED", "RECVONLY"),
            participant("2", "bob", "JOINED", "SENDRECV")
        ]);

        let result = reconcile(Some(&before), Some(&after), &ctx).unwrap();
        assert_eq!(result.updates.deltas.len(), 1);
        assert_eq!(result.updates.deltas[0].person.id.as_deref(), Some("alice"));
        assert!(result.updates.deltas[0].delta.audio_status);
        assert!(!result.updates.deltas[0].delta.video_status);
    }

    #[test]
    fn test_partner_in_call() {
        let roster = parsed(json!([
            participant("1", "alice", "JOINED", "SENDRECV"),
            participant("2", "bob", "LEFT", "SENDRECV")
        ]));

        let partner = find_partner(&roster, Some("alice")).unwrap();
        assert_eq!(partner.identity.as_deref(), Some("bob"));
        assert_eq!(partner.state, Some(ParticipantState::Left));
    }

    #[test]
    fn test_partner_skips_removed_and_non_users() {
        let mut resource = participant("2", "room", "JOINED", "SENDRECV");
        resource["type"] = json!("RESOURCE_ROOM");
        let mut removed = participant("3", "carol", "LEFT", "SENDRECV");
        removed["removed"] = json!(true);

        let roster = parsed(json!([
            participant("1", "alice", "JOINED", "SENDRECV"),
            resource,
            removed,
            participant("4", "dave", "JOINED", "SENDRECV")
        ]));

        let partner = find_partner(&roster, Some("alice")).unwrap();
        assert_eq!(partner.identity.as_deref(), Some("dave"));
        assert!(find_partner(&[], Some("alice")).is_none());
    }

    #[test]
    fn test_no_partner_without_self_identity() {
        let roster = parsed(json!([
            participant("1", "alice", "JOINED", "SENDRECV"),
            participant("2", "bob", "JOINED", "SENDRECV")
        ]));

        assert!(find_partner(&roster, None).is_none());
    }
}
