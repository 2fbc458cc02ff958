//! Field reconcilers: one pure function per meeting sub-domain.
//!
//! Each reconciler decodes the previous and current raw values of its domain
//! and returns `{previous, current, updates}`, where `updates` holds one flag
//! per semantically meaningful transition. Reconcilers never see the
//! canonical state; whatever they need from other domains arrives through
//! [`ReconcileContext`].

pub mod controls;
pub mod embedded_apps;
pub mod full_state;
pub mod host;
pub mod info;
pub mod media_shares;
pub mod roster;
pub mod self_state;

use crate::error::{LocusError, Result};
use crate::types::Domain;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Result of reconciling one domain.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled<T, U> {
    pub previous: Option<T>,
    pub current: T,
    pub updates: U,
}

/// Cross-domain inputs a reconciler may legitimately use.
#[derive(Clone, Debug, Default)]
pub struct ReconcileContext<'a> {
    /// Local device URL, used to pick "this device" out of `self.devices`.
    pub device_url: Option<&'a str>,
    /// Roles of the local participant as of this pass.
    pub roles: &'a [String],
    /// Whether the local participant is joined as of this pass.
    pub is_joined: bool,
}

/// Decode a raw domain value into its wire type.
pub(crate) fn decode<T: DeserializeOwned>(domain: Domain, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| LocusError::decode(domain, e))
}

/// A reconciler needs a current value; its absence is a caller bug.
pub(crate) fn require_current<'v>(domain: Domain, value: Option<&'v Value>) -> Result<&'v Value> {
    value.ok_or_else(|| {
        LocusError::Parameter(format!(
            "current {} must be defined to reconcile it",
            domain
        ))
    })
}
