//! Reconciler for `info`: meeting metadata, lock state and the display hints
//! that gate UI actions for the local user.

use super::{decode, require_current, ReconcileContext, Reconciled};
use crate::error::Result;
use crate::types::Domain;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LOCK_STATUS_LOCKED: &str = "LOCK_STATUS_LOCKED";
pub const LOCK_STATUS_UNLOCKED: &str = "LOCK_STATUS_UNLOCKED";

pub const ROLE_MODERATOR: &str = "MODERATOR";
pub const ROLE_COHOST: &str = "COHOST";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisplayHints {
    #[serde(default)]
    joined: Vec<String>,
    #[serde(default)]
    moderator: Vec<String>,
    #[serde(default)]
    co_host: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoPayload {
    sip_uri: Option<String>,
    web_ex_meeting_id: Option<String>,
    web_ex_meeting_name: Option<String>,
    owner: Option<String>,
    conversation_url: Option<String>,
    #[serde(default)]
    display_hints: DisplayHints,
}

/// Parsed meeting info.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoState {
    pub sip_uri: Option<String>,
    pub meeting_number: Option<String>,
    pub meeting_name: Option<String>,
    pub owner: Option<String>,
    pub conversation_url: Option<String>,
    pub is_locked: bool,
    pub is_unlocked: bool,
    /// Hints applicable to the local user given their roles and join state.
    pub user_display_hints: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InfoUpdates {
    pub is_locked: bool,
    pub is_unlocked: bool,
}

fn parse(raw: &Value, ctx: &ReconcileContext<'_>) -> Result<InfoState> {
    let payload: InfoPayload = decode(Domain::Info, raw)?;
    let hints = payload.display_hints;

    let mut sources: Vec<&[String]> = Vec::new();
    if ctx.is_joined {
        sources.push(&hints.joined);
    }
    for role in ctx.roles {
        match role.as_str() {
            ROLE_MODERATOR => sources.push(&hints.moderator),
            ROLE_COHOST => sources.push(&hints.co_host),
            _ => {}
        }
    }

    // First occurrence wins.
    let mut user_display_hints: Vec<String> = Vec::new();
    for hint in sources.into_iter().flatten() {
        if !user_display_hints.contains(hint) {
            user_display_hints.push(hint.clone());
        }
    }

    Ok(InfoState {
        sip_uri: payload.sip_uri,
        meeting_number: payload.web_ex_meeting_id,
        meeting_name: payload.web_ex_meeting_name,
        owner: payload.owner,
        conversation_url: payload.conversation_url,
        is_locked: hints.joined.iter().any(|h| h == LOCK_STATUS_LOCKED),
        is_unlocked: hints.joined.iter().any(|h| h == LOCK_STATUS_UNLOCKED),
        user_display_hints,
    })
}

/// Locked now, and either nothing was known before or it was unlocked.
pub fn became_locked(previous: Option<&InfoState>, current: &InfoState) -> bool {
    current.is_locked && previous.map_or(true, |p| p.is_unlocked || !p.is_locked)
}

pub fn became_unlocked(previous: Option<&InfoState>, current: &InfoState) -> bool {
    previous.is_some_and(|p| p.is_locked) && !current.is_locked
}

pub fn reconcile(
    old_raw: Option<&Value>,
    new_raw: Option<&Value>,
    ctx: &ReconcileContext<'_>,
) -> Result<Reconciled<InfoState, InfoUpdates>> {
    let current = parse(require_current(Domain::Info, new_raw)?, ctx)?;
    let previous = old_raw.map(|raw| parse(raw, ctx)).transpose()?;

    let updates = InfoUpdates {
        is_locked: became_locked(previous.as_ref(), &current),
        is_unlocked: became_unlocked(previous.as_ref(), &current),
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

    fn info(joined_hints: &[&str]) -> Value {
        json!({
            "sipUri": "meeting@example.com",
            "webExMeetingId": "123456789",
            "displayHints": {
                "joined": joined_hints,
                "moderator": ["LOCK_CONTROL_UNLOCK", "RECORDING_CONTROL_START"],
                "coHost": ["RECORDING_CONTROL_START"]
            }
        })
    }

    #[test]
    fn test_lock_transitions() {
        let ctx = ReconcileContext::default();
        let locked = info(&[LOCK_STATUS_LOCKED]);
        let unlocked = info(&[LOCK_STATUS_UNLOCKED]);

        assert!(reconcile(None, Some(&locked), &ctx).unwrap().updates.is_locked);

        let unlock = reconcile(Some(&locked), Some(&unlocked), &ctx).unwrap();
        assert!(unlock.updates.is_unlocked);
        assert!(!unlock.updates.is_locked);

        let relock = reconcile(Some(&unlocked), Some(&locked), &ctx).unwrap();
        assert!(relock.updates.is_locked);

        let same = reconcile(Some(&locked), Some(&locked), &ctx).unwrap();
        assert_eq!(same.updates, InfoUpdates::default());
    }

    #[test]
    fn test_first_unlocked_info_is_quiet() {
        let ctx = ReconcileContext::default();
        let result = reconcile(None, Some(&info(&[LOCK_STATUS_UNLOCKED])), &ctx).unwrap();
        assert_eq!(result.updates, InfoUpdates::default());
        assert_eq!(result.current.meeting_number.as_deref(), Some("123456789"));
    }

    #[test]
    fn test_user_display_hints_follow_roles() {
        let roles = vec![ROLE_MODERATOR.to_string()];
        let ctx = ReconcileContext {
            roles: &roles,
            is_joined: true,
            ..Default::default()
        };

        let result = reconcile(None, Some(&info(&[LOCK_STATUS_UNLOCKED])), &ctx).unwrap();
        assert_eq!(
            result.current.user_display_hints,
            vec![
                LOCK_STATUS_UNLOCKED.to_string(),
                "LOCK_CONTROL_UNLOCK".to_string(),
                "RECORDING_CONTROL_START".to_string()
            ]
        );

        let guest_ctx = ReconcileContext::default();
        let guest = reconcile(None, Some(&info(&[LOCK_STATUS_UNLOCKED])), &guest_ctx).unwrap();
        assert!(guest.current.user_display_hints.is_empty());
    }

    #[test]
    fn test_hints_shared_by_roles_appear_once() {
        let roles = vec![ROLE_MODERATOR.to_string(), ROLE_COHOST.to_string()];
        let ctx = ReconcileContext {
            roles: &roles,
            is_joined: true,
            ..Default::default()
        };

        let result = reconcile(None, Some(&info(&[LOCK_STATUS_UNLOCKED])), &ctx).unwrap();
        assert_eq!(
            result.current.user_display_hints,
            vec![
                LOCK_STATUS_UNLOCKED.to_string(),
                "LOCK_CONTROL_UNLOCK".to_string(),
                "RECORDING_CONTROL_START".to_string()
            ]
        );
    }
}
