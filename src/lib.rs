//! # Locus Sync
//!
//! Client-side state synchronization for a meeting session. The server
//! pushes the meeting's "locus" as full snapshots and partial deltas, each
//! stamped with a sequence; this crate keeps a canonical copy of it and
//! turns every accepted change into typed events.
//!
//! ## Core Concepts
//!
//! - **Sequencer**: orders snapshots, merges deltas and pauses on a gap
//! - **Field reconcilers**: pure per-domain parse and diff functions
//! - **State reconciler**: runs the reconcilers and collects what a pass produced
//! - **Liveness**: decides when the session is over
//!
//! ## Example
//!
//! ```ignore
//! use locus_sync::{DeliveryOutcome, EngineConfig, LocusEngine, SubscriptionFilter};
//!
//! let mut engine = LocusEngine::new(EngineConfig {
//!     device_url: Some("https://wdm/devices/1".into()),
//!     ..Default::default()
//! });
//! let events = engine.subscribe(SubscriptionFilter::all());
//!
//! if let DeliveryOutcome::Desync { resync_needed: true } = engine.deliver_json(&payload)? {
//!     engine.resync(&mut http_source)?;
//! }
//!
//! for event in events.drain() {
//!     println!("{} {:?}", event.scope, event.event);
//! }
//! ```

pub mod engine;
pub mod error;
pub mod liveness;
pub mod reconcilers;
pub mod sequencer;
pub mod state;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use engine::{DeliveryOutcome, EngineConfig, FullSnapshotSource, LocusEngine, MeetingSink};
pub use error::{LocusError, Result};
pub use liveness::{Teardown, TeardownReason};
pub use reconcilers::{ReconcileContext, Reconciled};
pub use sequencer::{Action, ResyncRequest, ResyncState, Sequencer};
pub use state::{CanonicalState, Pass, RawFieldCache, StateReconciler};
pub use subscriptions::{
    DropReason, EventKind, EventScope, LocusEvent, RemoteResponse, ScopedEvent, SubscriptionConfig,
    SubscriptionFilter, SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
pub use types::*;
