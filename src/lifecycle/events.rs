//! Synchronous event bus.
//!
//! # Responsibilities
//! - Topic subscriptions with a `*` wildcard
//! - Unsubscribe by id
//! - Announce every new subscription on [`SUBSCRIBED`] so monitors can track
//!   what was attached during a request
//!
//! # Design Decisions
//! - Listeners are invoked outside the lock, so a listener may subscribe or
//!   unsubscribe without deadlocking
//! - The announcement fires before the new listener is inserted; a listener
//!   never observes its own subscription
//! - A poisoned lock is recovered; the listener list stays consistent because
//!   it is only mutated under short critical sections

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Topic announcing a new subscription, payload [`Payload::Subscription`].
pub const SUBSCRIBED: &str = "bus.subscribed";

/// Topic announcing an opened pooled connection, payload [`Payload::Connection`].
pub const CONNECTION_OPENED: &str = "connection.opened";

/// Matches every topic.
pub const WILDCARD: &str = "*";

/// Handle returned by [`EventBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A pooled resource that must not outlive the request that opened it.
pub trait PooledConnection: Send + Sync {
    fn name(&self) -> &str;
    fn close(&self);
    fn is_open(&self) -> bool;
}

/// Event payload.
#[derive(Clone)]
pub enum Payload {
    Empty,
    Connection(Arc<dyn PooledConnection>),
    Subscription(SubscriptionId),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Connection(conn) => f.debug_tuple("Connection").field(&conn.name()).finish(),
            Payload::Subscription(id) => f.debug_tuple("Subscription").field(id).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub payload: Payload,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Event listener.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    topic: String,
    listener: Listener,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
pub struct EventBus {
    inner: Mutex<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe `listener` to `topic` (or [`WILDCARD`]).
    pub fn on<F>(&self, topic: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.lock();
            inner.next_id += 1;
            SubscriptionId(inner.next_id)
        };

        self.trigger(&Event::new(SUBSCRIBED, Payload::Subscription(id)));

        self.lock().subscriptions.push(Subscription {
            id,
            topic: topic.into(),
            listener: Arc::new(listener),
        });
        id
    }

    /// Remove a subscription. Returns false when it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        inner.subscriptions.len() != before
    }

    /// Deliver `event` to matching listeners in subscription order.
    pub fn trigger(&self, event: &Event) {
        let listeners: Vec<Listener> = self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.topic == event.name || s.topic == WILDCARD)
            .map(|s| s.listener.clone())
            .collect();

        tracing::trace!(event = %event.name, listeners = listeners.len(), "Event triggered");
        for listener in listeners {
            listener(event);
        }
    }

    /// Convenience for payload-less events.
    pub fn emit(&self, name: &str) {
        self.trigger(&Event::new(name, Payload::Empty));
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.lock().subscriptions.iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.len())
            .finish()
    }
}
