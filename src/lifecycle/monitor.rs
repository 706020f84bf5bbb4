//! Per-request monitors.
//!
//! # Responsibilities
//! - `Monitor`: process-wide observer engaged at the start of every request
//!   and drained at teardown
//! - `ConnectionMonitor`: tracks pooled connections opened during the
//!   request and force-closes them
//! - `EventMonitor`: tracks subscriptions made during the request and
//!   removes them, newest first
//!
//! # Design Decisions
//! - Monitors are built once per worker; only their records are per request
//! - `shutdown` drains and disengages; `off` only disengages
//! - The controller shuts monitors down in reverse engagement order

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::lifecycle::events::{
    EventBus, Payload, PooledConnection, SubscriptionId, CONNECTION_OPENED, SUBSCRIBED,
};

pub trait Monitor: Send {
    fn name(&self) -> &str;

    /// Start recording.
    fn on(&mut self, bus: &EventBus);

    /// Stop recording, keeping what was recorded.
    fn off(&mut self, bus: &EventBus);

    /// Release everything recorded and stop recording.
    fn shutdown(&mut self, bus: &EventBus) {
        self.off(bus);
    }

    fn is_engaged(&self) -> bool;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Closes pooled connections the request forgot to close.
#[derive(Default)]
pub struct ConnectionMonitor {
    subscription: Option<SubscriptionId>,
    opened: Arc<Mutex<Vec<Arc<dyn PooledConnection>>>>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections recorded since the last shutdown.
    pub fn tracked(&self) -> usize {
        lock(&self.opened).len()
    }
}

impl Monitor for ConnectionMonitor {
    fn name(&self) -> &str {
        "connections"
    }

    fn on(&mut self, bus: &EventBus) {
        if self.subscription.is_some() {
            return;
        }
        let opened = self.opened.clone();
        self.subscription = Some(bus.on(CONNECTION_OPENED, move |event| {
            if let Payload::Connection(conn) = &event.payload {
                lock(&opened).push(conn.clone());
            }
        }));
    }

    fn off(&mut self, bus: &EventBus) {
        if let Some(id) = self.subscription.take() {
            bus.off(id);
        }
    }

    fn shutdown(&mut self, bus: &EventBus) {
        self.off(bus);
        let opened = std::mem::take(&mut *lock(&self.opened));
        for conn in opened {
            if conn.is_open() {
                tracing::debug!(connection = %conn.name(), "Closing leaked pooled connection");
                conn.close();
            }
        }
    }

    fn is_engaged(&self) -> bool {
        self.subscription.is_some()
    }
}

/// Removes subscriptions made while engaged.
#[derive(Default)]
pub struct EventMonitor {
    subscription: Option<SubscriptionId>,
    recorded: Arc<Mutex<Vec<SubscriptionId>>>,
}

impl EventMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked(&self) -> usize {
        lock(&self.recorded).len()
    }
}

impl Monitor for EventMonitor {
    fn name(&self) -> &str {
        "events"
    }

    fn on(&mut self, bus: &EventBus) {
        if self.subscription.is_some() {
            return;
        }
        let recorded = self.recorded.clone();
        self.subscription = Some(bus.on(SUBSCRIBED, move |event| {
            if let Payload::Subscription(id) = event.payload {
                lock(&recorded).push(id);
            }
        }));
    }

    fn off(&mut self, bus: &EventBus) {
        if let Some(id) = self.subscription.take() {
            bus.off(id);
        }
    }

    fn shutdown(&mut self, bus: &EventBus) {
        self.off(bus);
        let recorded = std::mem::take(&mut *lock(&self.recorded));
        for id in recorded.into_iter().rev() {
            bus.off(id);
        }
    }

    fn is_engaged(&self) -> bool {
        self.subscription.is_some()
    }
}
