//! Session storage.
//!
//! # Responsibilities
//! - `SessionBackend`: pooled storage shared by every request of a worker
//!   (and across workers when the backend is)
//! - `Session`: per-request handle that loads on `open`, writes back on
//!   `close`, and issues a new id on first write
//!
//! # Design Decisions
//! - Writes to a closed session reopen it
//! - Only modified sessions are written back
//! - A freshly issued id is reported so the controller can emit the cookie
//! - The in-memory backend expires entries idle longer than its TTL: on
//!   load, and in a sweep every [`SWEEP_EVERY`] saves

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Session payload.
pub type SessionData = Map<String, Value>;

/// Storage backend for session payloads.
pub trait SessionBackend: Send + Sync {
    fn load(&self, id: &str) -> Option<SessionData>;
    fn save(&self, id: &str, data: SessionData);
    fn destroy(&self, id: &str);
}

/// Idle lifetime used by [`MemorySessionBackend::new`].
pub const DEFAULT_TTL: Duration = Duration::from_secs(1440);

/// Saves between two sweeps of expired entries.
pub const SWEEP_EVERY: u64 = 64;

#[derive(Debug)]
struct StoredSession {
    data: SessionData,
    touched: Instant,
}

/// In-memory backend with idle expiry.
#[derive(Debug)]
pub struct MemorySessionBackend {
    entries: DashMap<String, StoredSession>,
    ttl: Duration,
    saves: AtomicU64,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            saves: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry idle for at least the TTL. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.touched.elapsed() < self.ttl);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(purged, remaining = self.entries.len(), "Expired sessions purged");
        }
        purged
    }
}

impl Default for MemorySessionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBackend for MemorySessionBackend {
    fn load(&self, id: &str) -> Option<SessionData> {
        let expired = match self.entries.get_mut(id) {
            Some(mut entry) if entry.touched.elapsed() < self.ttl => {
                entry.touched = Instant::now();
                return Some(entry.data.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(id, |_, entry| entry.touched.elapsed() >= self.ttl);
        }
        None
    }

    fn save(&self, id: &str, data: SessionData) {
        self.entries.insert(
            id.to_string(),
            StoredSession {
                data,
                touched: Instant::now(),
            },
        );
        if self.saves.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }
    }

    fn destroy(&self, id: &str) {
        self.entries.remove(id);
    }
}

/// Per-request session handle.
pub struct Session {
    backend: Arc<dyn SessionBackend>,
    name: String,
    id: Option<String>,
    data: SessionData,
    open: bool,
    dirty: bool,
    issued: bool,
}

impl Session {
    pub fn new(backend: Arc<dyn SessionBackend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
            id: None,
            data: SessionData::new(),
            open: false,
            dirty: false,
            issued: false,
        }
    }

    /// Cookie name carrying the id.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Adopt the id sent by the client. Ignored while open.
    pub fn bind_id(&mut self, id: impl Into<String>) {
        if self.open {
            tracing::warn!(session = %self.name, "Cannot rebind an open session");
            return;
        }
        let id = id.into();
        if !id.is_empty() {
            self.id = Some(id);
            self.issued = false;
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// True when this request generated the id.
    pub fn is_new_id(&self) -> bool {
        self.issued
    }

    pub fn open(&mut self) {
        if self.open {
            return;
        }
        self.data = self
            .id
            .as_deref()
            .and_then(|id| self.backend.load(id))
            .unwrap_or_default();
        self.open = true;
        self.dirty = false;
    }

    /// Write back pending changes and release the session.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        if self.dirty {
            if let Some(id) = &self.id {
                self.backend.save(id, std::mem::take(&mut self.data));
            }
        }
        self.data.clear();
        self.open = false;
        self.dirty = false;
    }

    pub fn get(&mut self, key: &str) -> Option<&Value> {
        self.open();
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.open();
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().simple().to_string());
            self.issued = true;
        }
        self.data.insert(key.into(), value.into());
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.open();
        let removed = self.data.remove(key);
        self.dirty |= removed.is_some();
        removed
    }

    /// Drop the stored session entirely.
    pub fn destroy(&mut self) {
        if let Some(id) = self.id.take() {
            self.backend.destroy(&id);
        }
        self.data.clear();
        self.open = false;
        self.dirty = false;
        self.issued = false;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}
