//! Core types shared across the engine: the wire envelope and the small
//! vocabularies (participant state, meeting type, locus state) that several
//! reconcilers agree on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Locus event type for participant declines (one-on-one calls).
pub const EVENT_PARTICIPANT_DECLINED: &str = "locus.participant_declined";

/// Locus event type for participant joins (one-on-one calls).
pub const EVENT_PARTICIPANT_JOIN: &str = "locus.participant_join";

/// Self `reason` when moved into a breakout session.
pub const SELF_REASON_MOVED: &str = "MOVED";

/// Locus event type carried by deltas.
pub const EVENT_DIFFERENCE: &str = "locus.difference";

/// A locus sequence marker: explicit entries plus an optional compressed range.
///
/// A range of `0..0` means "no range".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocusSequence {
    #[serde(default)]
    pub entries: Vec<u64>,
    pub range_start: u64,
    pub range_end: u64,
}

impl LocusSequence {
    /// Sequence made only of entries.
    pub fn entries(entries: impl Into<Vec<u64>>) -> Self {
        Self {
            entries: entries.into(),
            range_start: 0,
            range_end: 0,
        }
    }

    /// Sequence with a range and trailing entries.
    pub fn ranged(range_start: u64, range_end: u64, entries: impl Into<Vec<u64>>) -> Self {
        Self {
            entries: entries.into(),
            range_start,
            range_end,
        }
    }

    /// No entries and no range.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.range_start == 0 && self.range_end == 0
    }

    /// Highest sequence number this marker covers: the last entry, else the
    /// range end. `None` when neither exists.
    pub fn max_sequence(&self) -> Option<u64> {
        match self.entries.last() {
            Some(last) => Some(*last),
            None if self.range_end != 0 => Some(self.range_end),
            None => None,
        }
    }
}

/// Server wire payload: a full snapshot, or a delta carrying only changed
/// top-level fields plus a `baseSequence`.
///
/// Domain values are kept as raw JSON so a malformed domain only fails its
/// own decode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<LocusSequence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_sequence: Option<LocusSequence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_url: Option<String>,

    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_shares: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_state: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_apps: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
}

impl RawSnapshot {
    /// Decode an envelope from a JSON value.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Decode an envelope from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Deltas are recognised by their base sequence.
    pub fn is_delta(&self) -> bool {
        self.base_sequence.is_some()
    }

    /// `self` says the user was moved into a breakout session. The rest of
    /// such a snapshot describes the locus being left behind.
    pub fn is_self_moved(&self) -> bool {
        self.self_.as_ref().is_some_and(|raw| {
            raw.get("reason").and_then(Value::as_str) == Some(SELF_REASON_MOVED)
                && raw.get("state").and_then(Value::as_str) == Some("LEFT")
        })
    }

    /// `links.services`, when present.
    pub fn services(&self) -> Option<&Value> {
        self.links.as_ref().and_then(|links| links.get("services"))
    }

    /// Raw value for a domain, if present in this snapshot.
    pub fn domain(&self, domain: Domain) -> Option<&Value> {
        match domain {
            Domain::Self_ => self.self_.as_ref(),
            Domain::Host => self.host.as_ref(),
            Domain::Controls => self.controls.as_ref(),
            Domain::Info => self.info.as_ref(),
            Domain::MediaShares => self.media_shares.as_ref(),
            Domain::FullState => self.full_state.as_ref(),
            Domain::EmbeddedApps => self.embedded_apps.as_ref(),
            Domain::Participants => self.participants.as_ref(),
        }
    }

    pub(crate) fn domain_mut(&mut self, domain: Domain) -> &mut Option<Value> {
        match domain {
            Domain::Self_ => &mut self.self_,
            Domain::Host => &mut self.host,
            Domain::Controls => &mut self.controls,
            Domain::Info => &mut self.info,
            Domain::MediaShares => &mut self.media_shares,
            Domain::FullState => &mut self.full_state,
            Domain::EmbeddedApps => &mut self.embedded_apps,
            Domain::Participants => &mut self.participants,
        }
    }
}

/// Meeting sub-domains, each with its own reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Domain {
    #[serde(rename = "self")]
    Self_,
    Host,
    Controls,
    Info,
    MediaShares,
    FullState,
    EmbeddedApps,
    Participants,
}

impl Domain {
    /// Every domain, in reconciliation order. `FullState` and `Self_` come
    /// before `Info` and `Participants` since those read their results.
    pub const ALL: [Domain; 8] = [
        Domain::Controls,
        Domain::FullState,
        Domain::Self_,
        Domain::Host,
        Domain::Info,
        Domain::MediaShares,
        Domain::EmbeddedApps,
        Domain::Participants,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Self_ => "self",
            Domain::Host => "host",
            Domain::Controls => "controls",
            Domain::Info => "info",
            Domain::MediaShares => "mediaShares",
            Domain::FullState => "fullState",
            Domain::EmbeddedApps => "embeddedApps",
            Domain::Participants => "participants",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Participant (and self) lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantState {
    Idle,
    Notified,
    Joined,
    Declined,
    Left,
    #[serde(other)]
    Unknown,
}

/// Coarse meeting type from the full state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeetingType {
    Call,
    Meeting,
    SipBridge,
    #[serde(other)]
    Unknown,
}

impl MeetingType {
    /// One-on-one call semantics apply.
    pub fn is_call(&self) -> bool {
        matches!(self, MeetingType::Call | MeetingType::SipBridge)
    }
}

/// Coarse meeting lifecycle from the full state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocusState {
    Initializing,
    Active,
    Terminating,
    Inactive,
    #[serde(other)]
    Unknown,
}

/// One endpoint advertised under `links.services`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLink {
    pub url: Option<String>,
}

/// Service endpoints the locus advertises for this meeting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLinks {
    pub breakout: Option<ServiceLink>,
    pub record: Option<ServiceLink>,
}

/// Fields the owning session merges into its visible state, independent of
/// the event stream. Unset fields are left untouched by the receiver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locus_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner: Option<crate::reconcilers::roster::Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_state: Option<LocusState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_type: Option<MeetingType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_exit_tone: Option<crate::reconcilers::controls::EntryExitTone>,
}

impl MeetingUpdate {
    /// No field is set.
    pub fn is_empty(&self) -> bool {
        *self == MeetingUpdate::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_delta_envelope() {
        let snapshot = RawSnapshot::from_value(json!({
            "url": "https://locus/loci/1",
            "sequence": {"entries": [12], "rangeStart": 0, "rangeEnd": 0},
            "baseSequence": {"entries": [11], "rangeStart": 0, "rangeEnd": 0},
            "self": {"state": "JOINED"}
        }))
        .unwrap();

        assert!(snapshot.is_delta());
        assert!(snapshot.domain(Domain::Self_).is_some());
        assert!(snapshot.domain(Domain::Host).is_none());
    }

    #[test]
    fn test_moved_self_and_services() {
        let snapshot = RawSnapshot::from_value(json!({
            "self": {"state": "LEFT", "reason": "MOVED"},
            "links": {"services": {"breakout": {"url": "https://breakout/1"}}}
        }))
        .unwrap();
        assert!(snapshot.is_self_moved());
        assert!(snapshot.services().is_some());

        let left = RawSnapshot::from_value(json!({"self": {"state": "LEFT"}})).unwrap();
        assert!(!left.is_self_moved());
        assert!(left.services().is_none());
    }

    #[test]
    fn test_max_sequence() {
        assert_eq!(LocusSequence::entries(vec![1, 5, 9]).max_sequence(), Some(9));
        assert_eq!(LocusSequence::ranged(1, 40, vec![]).max_sequence(), Some(40));
        assert_eq!(LocusSequence::default().max_sequence(), None);
        assert!(LocusSequence::default().is_empty());
    }

    #[test]
    fn test_unknown_states_decode() {
        let state: ParticipantState = serde_json::from_value(json!("LOBBY")).unwrap();
        assert_eq!(state, ParticipantState::Unknown);
        let kind: MeetingType = serde_json::from_value(json!("SIP_BRIDGE")).unwrap();
        assert!(kind.is_call());
    }
}
