//! Canonical meeting state and the reconciler that maintains it.
//!
//! A pass walks the domains of an accepted snapshot in a fixed order,
//! reconciles only those whose raw value changed, and returns what it
//! produced (events, session updates, skipped domains, teardown) instead of
//! emitting directly. Nothing set during one pass is read by a later one
//! except the canonical state and the raw cache.

mod cache;
mod canonical;
mod reconciler;

pub use cache::RawFieldCache;
pub use canonical::CanonicalState;
pub use reconciler::{Pass, StateReconciler};
