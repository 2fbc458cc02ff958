//! Reconciler for `embeddedApps`.

use super::{decode, require_current, ReconcileContext, Reconciled};
use crate::error::Result;
use crate::types::Domain;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedApp {
    pub url: Option<String>,
    pub app_id: Option<String>,
    pub instance_info: Option<InstanceInfo>,
    pub title: Option<String>,
    pub state: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub app_instance_url: Option<String>,
}

impl EmbeddedApp {
    pub fn instance_url(&self) -> Option<&str> {
        self.instance_info
            .as_ref()
            .and_then(|info| info.app_instance_url.as_deref())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmbeddedAppsUpdates {
    pub changed: bool,
}

/// Same length and, pairwise, the same app id, state and instance url.
/// Titles and timestamps do not matter.
pub fn are_similar(previous: &[EmbeddedApp], current: &[EmbeddedApp]) -> bool {
    previous.len() == current.len()
        && previous.iter().zip(current).all(|(a, b)| {
            a.app_id == b.app_id && a.state == b.state && a.instance_url() == b.instance_url()
        })
}

pub fn reconcile(
    old_raw: Option<&Value>,
    new_raw: Option<&Value>,
    _ctx: &ReconcileContext<'_>,
) -> Result<Reconciled<Vec<EmbeddedApp>, EmbeddedAppsUpdates>> {
    let current: Vec<EmbeddedApp> =
        decode(Domain::EmbeddedApps, require_current(Domain::EmbeddedApps, new_raw)?)?;
    let previous: Option<Vec<EmbeddedApp>> = old_raw
        .map(|raw| decode(Domain::EmbeddedApps, raw))
        .transpose()?;

    let updates = EmbeddedAppsUpdates {
        changed: !previous.as_deref().is_some_and(|p| are_similar(p, &current)),
    };

    Ok(Reconciled {
        previous,
        current,
        updates,
    })
}
