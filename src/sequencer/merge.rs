//! Delta application onto the working copy.

use crate::types::{Domain, RawSnapshot};
use serde_json::Value;

/// Apply a delta to the working copy.
///
/// Top-level fields present in the delta overwrite the working copy, except
/// `participants`, which are merged by participant `id`. Sequence markers
/// come from the delta; the result is a full snapshot again, so it carries no
/// base sequence.
pub fn apply_delta(working_copy: &RawSnapshot, delta: &RawSnapshot) -> RawSnapshot {
    let mut merged = working_copy.clone();

    merged.sequence = delta.sequence.clone().or(merged.sequence);
    merged.base_sequence = None;
    merged.event_type = delta.event_type.clone();

    if delta.url.is_some() {
        merged.url = delta.url.clone();
    }
    if delta.sync_url.is_some() {
        merged.sync_url = delta.sync_url.clone();
    }
    if delta.conversation_url.is_some() {
        merged.conversation_url = delta.conversation_url.clone();
    }
    if delta.links.is_some() {
        merged.links = delta.links.clone();
    }

    for domain in Domain::ALL {
        let Some(incoming) = delta.domain(domain) else {
            continue;
        };

        let slot = merged.domain_mut(domain);
        *slot = match (domain, slot.take()) {
            (Domain::Participants, Some(existing)) => {
                Some(merge_participants(existing, incoming.clone()))
            }
            _ => Some(incoming.clone()),
        };
    }

    merged
}

/// Merge participant lists by `id`: replace existing entries, append new ones.
///
/// Anything that is not a pair of arrays falls back to the incoming value.
pub fn merge_participants(existing: Value, incoming: Value) -> Value {
    let (Value::Array(mut participants), Value::Array(updates)) = (existing, incoming.clone())
    else {
        return incoming;
    };

    if updates.is_empty() {
        return Value::Array(participants);
    }

    for update in updates {
        let position = update
            .get("id")
            .and_then(|id| participants.iter().position(|p| p.get("id") == Some(id)));

        match position {
            Some(index) => participants[index] = update,
            None => participants.push(update),
        }
    }

    Value::Array(participants)
}
