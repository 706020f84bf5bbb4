//! Per-request context.
//!
//! Built fresh from the immutable configuration for every request and
//! dropped at teardown. Collaborators (bootstrap routines, actions, the
//! error handler) receive it by reference; nothing request-scoped lives in
//! a global.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::http::adapter::REQUEST_ID_ATTRIBUTE;
use crate::http::request::RequestState;
use crate::http::response::ResponseState;
use crate::lifecycle::events::{Event, EventBus, Payload, PooledConnection, CONNECTION_OPENED};
use crate::session::Session;

pub struct RequestContext {
    pub request: RequestState,
    pub response: ResponseState,
    session: Option<Session>,
    events: Arc<EventBus>,
    config: Arc<BridgeConfig>,
    uploads: Vec<PathBuf>,
    request_id: String,
}

impl RequestContext {
    pub fn new(
        request: RequestState,
        config: Arc<BridgeConfig>,
        events: Arc<EventBus>,
        session: Option<Session>,
    ) -> Self {
        let request_id = match request.inbound().attribute(REQUEST_ID_ATTRIBUTE) {
            Some(Value::String(id)) => id.clone(),
            _ => Uuid::new_v4().to_string(),
        };

        let mut response = ResponseState::new();
        response.set_charset(config.app.charset.clone());

        Self {
            request,
            response,
            session,
            events,
            config,
            uploads: Vec::new(),
            request_id,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_debug(&self) -> bool {
        self.config.app.debug
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn session(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub(crate) fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Announce a pooled connection so it is closed at teardown.
    pub fn track_connection(&self, conn: Arc<dyn PooledConnection>) {
        self.events
            .trigger(&Event::new(CONNECTION_OPENED, Payload::Connection(conn)));
    }

    /// Register a temporary upload file; it is removed at teardown.
    pub fn track_upload(&mut self, path: impl Into<PathBuf>) {
        self.uploads.push(path.into());
    }

    pub fn uploads(&self) -> &[PathBuf] {
        &self.uploads
    }

    pub(crate) fn clear_uploads(&mut self) {
        for path in self.uploads.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload");
                }
            }
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("status", &self.response.status())
            .finish_non_exhaustive()
    }
}
