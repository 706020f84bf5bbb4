//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::{StatusCode, Uri};
use serde_json::{json, Value};

use worker_bridge::config::BridgeConfig;
use worker_bridge::error::BridgeError;
use worker_bridge::http::{InboundMessage, OutboundMessage, ResponseFormat};
use worker_bridge::lifecycle::{
    Application, ApplicationBuilder, EventBus, MemoryProbe, Monitor, PooledConnection,
};
use worker_bridge::observability::LogSink;
use worker_bridge::routing::{ActionResult, Router};
use worker_bridge::worker::Transport;

/// Build a GET message for `uri`.
pub fn get(uri: &str) -> InboundMessage {
    InboundMessage::get(uri.parse::<Uri>().unwrap())
}

/// Connection that only records whether it was closed.
pub struct FakeConnection {
    name: String,
    open: AtomicBool,
}

impl FakeConnection {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            open: AtomicBool::new(true),
        })
    }
}

impl PooledConnection for FakeConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Memory probe whose reading the test controls.
#[derive(Clone, Default)]
pub struct FakeProbe(pub Arc<AtomicU64>);

impl FakeProbe {
    pub fn set(&self, bytes: u64) {
        self.0.store(bytes, Ordering::SeqCst);
    }
}

impl MemoryProbe for FakeProbe {
    fn resident_bytes(&self) -> Option<u64> {
        Some(self.0.load(Ordering::SeqCst))
    }
}

/// Monitor that appends `on:<name>` / `shutdown:<name>` to a shared log.
pub struct RecordingMonitor {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    engaged: bool,
}

impl RecordingMonitor {
    pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Box<Self> {
        Box::new(Self {
            name: name.to_string(),
            log,
            engaged: false,
        })
    }
}

impl Monitor for RecordingMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn on(&mut self, _bus: &EventBus) {
        self.engaged = true;
        self.log.lock().unwrap().push(format!("on:{}", self.name));
    }

    fn off(&mut self, _bus: &EventBus) {
        self.engaged = false;
    }

    fn shutdown(&mut self, bus: &EventBus) {
        self.log.lock().unwrap().push(format!("shutdown:{}", self.name));
        self.off(bus);
    }

    fn is_engaged(&self) -> bool {
        self.engaged
    }
}

/// Monitor whose shutdown always panics.
pub struct PanickingMonitor;

impl Monitor for PanickingMonitor {
    fn name(&self) -> &str {
        "panicking"
    }

    fn on(&mut self, _bus: &EventBus) {}

    fn off(&mut self, _bus: &EventBus) {}

    fn shutdown(&mut self, _bus: &EventBus) {
        panic!("monitor shutdown exploded")
    }

    fn is_engaged(&self) -> bool {
        false
    }
}

/// Sink counting its flushes.
#[derive(Clone, Default)]
pub struct CountingSink(pub Arc<AtomicUsize>);

impl CountingSink {
    pub fn flushes(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl LogSink for CountingSink {
    fn flush(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sink whose flush always panics.
pub struct PanickingSink;

impl LogSink for PanickingSink {
    fn flush(&self) {
        panic!("sink flush exploded")
    }
}

/// Transport fed from a queue, collecting everything the worker sends back.
#[derive(Default)]
pub struct QueueTransport {
    pub pending: VecDeque<InboundMessage>,
    pub responses: Vec<OutboundMessage>,
    pub errors: Vec<String>,
    pub stopped: bool,
}

impl QueueTransport {
    pub fn with(messages: impl IntoIterator<Item = InboundMessage>) -> Self {
        Self {
            pending: messages.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Transport for QueueTransport {
    fn accept_request(&mut self) -> Option<InboundMessage> {
        self.pending.pop_front()
    }

    fn respond(&mut self, message: OutboundMessage) {
        self.responses.push(message);
    }

    fn report_worker_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn stop_worker(&mut self) {
        self.stopped = true;
    }
}

/// Shared handles the demo routes write into.
#[derive(Clone, Default)]
pub struct Fixture {
    pub connections: Arc<Mutex<Vec<Arc<FakeConnection>>>>,
    pub probe: FakeProbe,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes used across the integration tests.
    pub fn router(&self, config: &BridgeConfig) -> Router {
        let connections = self.connections.clone();
        Router::from_config(&config.routing, config.app.default_route.clone())
            .action("site/index", |_ctx, _params| Ok(Value::from("<h1>home</h1>").into()))
            .action("site/get", |ctx, _params| {
                ctx.response.set_format(ResponseFormat::Json);
                Ok(Value::Object(ctx.request.query_params().clone()).into())
            })
            .action("site/fail", |_ctx, _params| {
                Err(BridgeError::internal("database password is hunter2"))
            })
            .action("site/forbidden", |_ctx, _params| {
                Err(BridgeError::http(StatusCode::FORBIDDEN, "Members only"))
            })
            .action("site/panic", |_ctx, _params| -> Result<ActionResult, BridgeError> {
                panic!("action exploded")
            })
            .action("site/db", move |ctx, _params| {
                let conn = FakeConnection::new("db");
                connections.lock().unwrap().push(conn.clone());
                ctx.track_connection(conn);
                Err(BridgeError::internal("query failed"))
            })
            .action("site/counter", |ctx, _params| {
                ctx.response.set_format(ResponseFormat::Json);
                let session = ctx
                    .session()
                    .ok_or_else(|| BridgeError::internal("sessions disabled"))?;
                let next = session.get("count").and_then(Value::as_u64).unwrap_or(0) + 1;
                session.set("count", next);
                Ok(json!({ "count": next }).into())
            })
            .action("site/error", |_ctx, params| {
                let message = params.get("message").and_then(Value::as_str).unwrap_or("");
                Ok(Value::from(format!("<p>Oops: {}</p>", message)).into())
            })
            .action("site/listen", |ctx, _params| {
                ctx.events().on("custom.event", |_event| {});
                Ok(ActionResult::Empty)
            })
    }

    /// Builder over the demo routes with the fake memory probe installed.
    pub fn builder(&self, config: BridgeConfig) -> ApplicationBuilder {
        let router = self.router(&config);
        Application::builder(Arc::new(config), Arc::new(router))
            .memory_probe(Box::new(self.probe.clone()))
    }

    pub fn app(&self, config: BridgeConfig) -> Application {
        self.builder(config).build().unwrap()
    }
}
