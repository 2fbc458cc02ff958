//! Reconciler for `fullState`: coarse meeting type and lifecycle.

use super::{decode, require_current, ReconcileContext, Reconciled};
use crate::error::Result;
use crate::types::{Domain, LocusState, MeetingType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullState {
    #[serde(rename = "type")]
    pub kind: Option<MeetingType>,
    pub state: Option<LocusState>,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub locked: bool,
    pub last_active: Option<String>,
}

impl FullState {
    pub fn is_call(&self) -> bool {
        self.kind.is_some_and(|kind| kind.is_call())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FullStateUpdates {
    /// Set to the new state when it differs from the previous one.
    pub meeting_state_changed_to: Option<LocusState>,
    /// Set to the new type when it differs from the previous one.
    pub meeting_type_changed_to: Option<MeetingType>,
}

pub fn reconcile(
    old_raw: Option<&Value>,
    new_raw: Option<&Value>,
    _ctx: &ReconcileContext<'_>,
) -> Result<Reconciled<FullState, FullStateUpdates>> {
    let current: FullState =
        decode(Domain::FullState, require_current(Domain::FullState, new_raw)?)?;
    let previous: Option<FullState> = old_raw
        .map(|raw| decode(Domain::FullState, raw))
        .transpose()?;

    let updates = FullStateUpdates {
        meeting_state_changed_to: current
            .state
            .filter(|state| previous.as_ref().and_then(|p| p.state) != Some(*state)),
        meeting_type_changed_to: current
            .kind
            .filter(|kind| previous.as_ref().and_then(|p| p.kind) != Some(*kind)),
    };

    Ok(Reconciled {
        previous,
        current,
        updates,
    })
}
