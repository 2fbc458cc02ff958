//! Reconciler for `mediaShares`: who holds the content and whiteboard floors.

use super::{decode, require_current, ReconcileContext, Reconciled};
use crate::error::Result;
use crate::types::Domain;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CONTENT: &str = "content";
const WHITEBOARD: &str = "whiteboard";

#[derive(Clone, Debug, Default, Deserialize)]
struct PartyRef {
    id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Floor {
    disposition: Option<String>,
    beneficiary: Option<PartyRef>,
    requester: Option<PartyRef>,
    granted: Option<String>,
    released: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaShare {
    name: Option<String>,
    url: Option<String>,
    resource_url: Option<String>,
    floor: Option<Floor>,
}

/// Floor state of one share.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareFloor {
    pub disposition: Option<String>,
    pub beneficiary_id: Option<String>,
    pub requester_id: Option<String>,
    pub granted: Option<String>,
    pub released: Option<String>,
    pub url: Option<String>,
    pub resource_url: Option<String>,
}

impl ShareFloor {
    pub fn is_granted(&self) -> bool {
        self.disposition.as_deref() == Some("GRANTED")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSharesState {
    pub content: ShareFloor,
    pub whiteboard: ShareFloor,
}

/// Media shares have no individual flags: any change republishes
/// `{current, previous}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MediaSharesUpdates {
    pub changed: bool,
}

fn floor_of(shares: &[MediaShare], name: &str) -> ShareFloor {
    let Some(share) = shares.iter().find(|s| s.name.as_deref() == Some(name)) else {
        return ShareFloor::default();
    };
    let floor = share.floor.clone().unwrap_or_default();

    ShareFloor {
        disposition: floor.disposition,
        beneficiary_id: floor.beneficiary.and_then(|b| b.id),
        requester_id: floor.requester.and_then(|r| r.id),
        granted: floor.granted,
        released: floor.released,
        url: share.url.clone(),
        resource_url: share.resource_url.clone(),
    }
}

fn parse(raw: &Value) -> Result<MediaSharesState> {
    let shares: Vec<MediaShare> = decode(Domain::MediaShares, raw)?;
    Ok(MediaSharesState {
        content: floor_of(&shares, CONTENT),
        whiteboard: floor_of(&shares, WHITEBOARD),
    })
}

pub fn reconcile(
    old_raw: Option<&Value>,
    new_raw: Option<&Value>,
    _ctx: &ReconcileContext<'_>,
) -> Result<Reconciled<MediaSharesState, MediaSharesUpdates>> {
    let current = parse(require_current(Domain::MediaShares, new_raw)?)?;
    let previous = old_raw.map(parse).transpose()?;

    let updates = MediaSharesUpdates {
        changed: previous.as_ref() != Some(&current),
    };

    Ok(Reconciled {
        previous,
        current,
        updates,
    })
}
