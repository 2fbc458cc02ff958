//! Subscription manager for broadcasting locus events.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::types::{
    DropReason, EventScope, LocusEvent, ScopedEvent, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId,
};

const SCOPE: EventScope = EventScope::new("subscriptions", "broadcast");

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<ScopedEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: ScopedEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }

    fn notify_dropped(&self, reason: DropReason) {
        // Best effort: the buffer may be the reason we are here.
        let _ = self.sender.try_send(ScopedEvent {
            scope: SCOPE,
            event: LocusEvent::Dropped { reason },
        });
    }
}

/// Manages subscriptions and broadcasts events.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription. Only events broadcast after this call are
    /// delivered.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);

        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            sub.notify_dropped(DropReason::Unsubscribed);
        }
    }

    /// Drop every subscriber, telling each why.
    pub fn close_all(&self, reason: DropReason) {
        let mut subs = self.subscriptions.write();
        for (_, sub) in subs.drain() {
            sub.notify_dropped(reason.clone());
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Broadcast an event to matching subscriptions. Drops subscribers that
    /// fail to receive.
    pub fn broadcast(&self, scope: EventScope, event: LocusEvent) {
        let scoped = ScopedEvent { scope, event };
        debug!(scope = %scope, kind = ?scoped.event.kind(), "emit");

        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.config.filter.matches(&scoped) && !sub.try_send(scoped.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        // Remove dropped subscriptions
        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(subscription = id.0, "dropping slow subscriber");
                    sub.notify_dropped(DropReason::BufferOverflow);
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::types::{EventKind, SubscriptionFilter};
    use std::time::Duration;

    const TEST_SCOPE: EventScope = EventScope::new("locus-info", "test");

    fn url_event(n: usize) -> LocusEvent {
        LocusEvent::LocusInfoUpdateUrl {
            url: format!("https://locus/loci/{}", n),
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();

        let handle = manager.subscribe(SubscriptionConfig::default());
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            event.event,
            LocusEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        );
    }

    #[test]
    fn test_broadcast_to_matching() {
        let manager = SubscriptionManager::new();

        let config = SubscriptionConfig {
            filter: SubscriptionFilter::kinds(vec![EventKind::LocusInfoUpdateUrl]),
            ..Default::default()
        };
        let handle = manager.subscribe(config);

        manager.broadcast(TEST_SCOPE, url_event(1));

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event.scope, TEST_SCOPE);
        assert_eq!(event.event, url_event(1));
    }

    #[test]
    fn test_broadcast_filters_non_matching() {
        let manager = SubscriptionManager::new();

        let config = SubscriptionConfig {
            filter: SubscriptionFilter::kinds(vec![EventKind::DestroyMeeting]),
            ..Default::default()
        };
        let handle = manager.subscribe(config);

        manager.broadcast(TEST_SCOPE, url_event(1));

        let result = handle.recv_timeout(Duration::from_millis(50));
        assert!(result.is_err());
    }

    #[test]
    fn test_component_filter() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig {
            filter: SubscriptionFilter::components(vec!["liveness".to_string()]),
            ..Default::default()
        });

        manager.broadcast(TEST_SCOPE, url_event(1));
        manager.broadcast(EventScope::new("liveness", "check"), url_event(2));

        let events = handle.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, url_event(2));
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            buffer_size: 2,
            filter: SubscriptionFilter::all(),
        };
        let _handle = manager.subscribe(config);

        for i in 0..10 {
            manager.broadcast(TEST_SCOPE, url_event(i));
        }

        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_close_all() {
        let manager = SubscriptionManager::new();
        let a = manager.subscribe(SubscriptionConfig::default());
        let b = manager.subscribe(SubscriptionConfig::default());

        manager.close_all(DropReason::SessionEnded);

        assert_eq!(manager.subscription_count(), 0);
        for handle in [a, b] {
            let event = handle.try_recv().unwrap();
            assert_eq!(event.event.kind(), EventKind::Dropped);
        }
    }
}
