//! The client's authoritative view of the meeting.

use crate::reconcilers::controls::ControlsState;
use crate::reconcilers::embedded_apps::EmbeddedApp;
use crate::reconcilers::full_state::FullState;
use crate::reconcilers::host::HostState;
use crate::reconcilers::info::InfoState;
use crate::reconcilers::media_shares::MediaSharesState;
use crate::reconcilers::roster::Participant;
use crate::reconcilers::self_state::SelfState;
use crate::types::{ParticipantState, ServiceLinks};
use serde::Serialize;

/// One sub-tree per domain plus the few session-level values derived from
/// several of them. Created empty; populated by the first full snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalState {
    pub url: Option<String>,
    pub conversation_url: Option<String>,
    pub sip_uri: Option<String>,

    #[serde(rename = "self")]
    pub self_state: Option<SelfState>,
    pub host: Option<HostState>,
    pub controls: Option<ControlsState>,
    pub info: Option<InfoState>,
    pub media_shares: Option<MediaSharesState>,
    pub full_state: Option<FullState>,
    pub embedded_apps: Option<Vec<EmbeddedApp>>,
    pub participants: Vec<Participant>,
    pub services: Option<ServiceLinks>,

    /// Other party of a call; kept when a later roster no longer yields one.
    pub partner: Option<Participant>,

    /// Distinct self states in the order they were observed.
    states: Vec<ParticipantState>,
}

impl CanonicalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a self state unless it repeats the last one.
    pub fn record_self_state(&mut self, state: ParticipantState) {
        if self.states.last() != Some(&state) {
            self.states.push(state);
        }
    }

    pub fn self_state_history(&self) -> &[ParticipantState] {
        &self.states
    }

    pub fn is_call(&self) -> bool {
        self.full_state.as_ref().is_some_and(FullState::is_call)
    }

    pub fn self_identity(&self) -> Option<&str> {
        self.self_state.as_ref().and_then(|s| s.self_identity.as_deref())
    }

    pub fn roles(&self) -> &[String] {
        self.self_state
            .as_ref()
            .map(|s| s.roles.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_joined(&self) -> bool {
        self.self_state.as_ref().is_some_and(SelfState::is_joined)
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host.as_ref().and_then(|h| h.host_id.as_deref())
    }
}
