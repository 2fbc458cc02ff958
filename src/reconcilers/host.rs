//! Reconciler for `host`.

use super::{decode, require_current, ReconcileContext, Reconciled};
use crate::error::Result;
use crate::types::Domain;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostState {
    #[serde(rename = "id")]
    pub host_id: Option<String>,
    pub name: Option<String>,
    pub org_id: Option<String>,
    pub incoming_call_protocols: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostUpdates {
    pub is_new_host: bool,
}

/// Either side missing counts as a new host.
pub fn is_new_host(previous: Option<&HostState>, current: Option<&HostState>) -> bool {
    match (previous, current) {
        (Some(previous), Some(current)) => previous.host_id != current.host_id,
        _ => true,
    }
}

pub fn reconcile(
    old_raw: Option<&Value>,
    new_raw: Option<&Value>,
    _ctx: &ReconcileContext<'_>,
) -> Result<Reconciled<HostState, HostUpdates>> {
    let current: HostState = decode(Domain::Host, require_current(Domain::Host, new_raw)?)?;
    let previous: Option<HostState> = old_raw.map(|raw| decode(Domain::Host, raw)).transpose()?;

    let updates = HostUpdates {
        is_new_host: is_new_host(previous.as_ref(), Some(&current)),
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

    #[test]
    fn test_host_change() {
        let ctx = ReconcileContext::default();
        let a = json!({"id": "host-a", "name": "A", "orgId": "org"});
        let b = json!({"id": "host-b", "name": "B", "orgId": "org"});

        let first = reconcile(None, Some(&a), &ctx).unwrap();
        assert!(first.updates.is_new_host);
        assert_eq!(first.current.host_id.as_deref(), Some("host-a"));

        assert!(reconcile(Some(&a), Some(&b), &ctx).unwrap().updates.is_new_host);

        // A rename alone is not a new host.
        let renamed = json!({"id": "host-a", "name": "A2"});
        assert!(!reconcile(Some(&a), Some(&renamed), &ctx).unwrap().updates.is_new_host);
    }

    #[test]
    fn test_missing_side_is_new_host() {
        assert!(is_new_host(None, None));
        assert!(is_new_host(Some(&HostState::default()), None));
    }
}
