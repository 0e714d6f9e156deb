//! In-process publish/subscribe channel for lifecycle events.
//!
//! Delivery is synchronous: [`EventBus::publish`] calls every subscriber on the
//! publishing thread before returning. Subscribers are snapshotted before
//! delivery, so a subscriber may subscribe or unsubscribe from inside
//! `deliver` without deadlocking.

use crate::event::Event;
use crate::ids::BusId;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Receives events published on a bus.
pub trait EventSubscriber: Send + Sync {
    /// Called once per published event, on the publisher's thread.
    fn deliver(&self, event: &Event);
}

impl<F> EventSubscriber for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn deliver(&self, event: &Event) {
        self(event)
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe channel identified by a [`BusId`].
pub struct EventBus {
    id: BusId,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>>,
    next_subscription: AtomicU64,
    closed: AtomicBool,
    published: AtomicU64,
}

impl EventBus {
    /// Creates an empty, open bus with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: BusId::new(),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            published: AtomicU64::new(0),
        }
    }

    /// The process-wide default bus used by workflows built without an explicit one.
    pub fn process_default() -> Arc<EventBus> {
        static DEFAULT: OnceLock<Arc<EventBus>> = OnceLock::new();
        DEFAULT.get_or_init(|| Arc::new(EventBus::new())).clone()
    }

    /// Returns this bus' identity.
    pub fn id(&self) -> BusId {
        self.id
    }

    /// Registers a subscriber. Subscribing to a closed bus is accepted but the
    /// subscriber never receives anything.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        if self.is_closed() {
            debug!(bus = %self.id, "subscribe on closed bus ignored");
            return id;
        }
        self.subscribers.write().push((id, subscriber));
        id
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Delivers `event` to every subscriber. Returns how many received it.
    pub fn publish(&self, event: Event) -> usize {
        if self.is_closed() {
            trace!(bus = %self.id, event = %event.name, source = %event.source, "dropping event on closed bus");
            return 0;
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        let snapshot: Vec<Arc<dyn EventSubscriber>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, sub)| Arc::clone(sub))
            .collect();

        trace!(bus = %self.id, event = %event.name, source = %event.source, subscribers = snapshot.len(), "publishing");
        for subscriber in &snapshot {
            subscriber.deliver(&event);
        }
        snapshot.len()
    }

    /// Closes the bus and drops every subscriber. Later publishes are discarded.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let dropped = {
                let mut subscribers = self.subscribers.write();
                let count = subscribers.len();
                subscribers.clear();
                count
            };
            debug!(bus = %self.id, dropped, "event bus closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of events accepted for delivery since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.id)
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
