//! Event delivery to the owning session.
//!
//! Every transition the engine detects is published as a [`LocusEvent`]
//! tagged with the [`EventScope`] that raised it. Subscriptions support:
//! - Filtering by event kind or originating component
//! - Bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let handle = engine.subscribe_with(SubscriptionConfig {
//!     filter: SubscriptionFilter::kinds(vec![EventKind::DestroyMeeting]),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(ScopedEvent { event: LocusEvent::DestroyMeeting { reason, should_leave }, .. }) => {
//!             println!("meeting over: {:?} (leave: {})", reason, should_leave);
//!         }
//!         Ok(ScopedEvent { event: LocusEvent::Dropped { .. }, .. }) => break,
//!         Ok(_) => {}
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, EventKind, EventScope, LocusEvent, RemoteResponse, ScopedEvent, SubscriptionConfig,
    SubscriptionFilter, SubscriptionHandle, SubscriptionId,
};
