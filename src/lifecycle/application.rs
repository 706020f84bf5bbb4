//! Lifecycle controller.
//!
//! # Responsibilities
//! - Rebuild a clean per-request context from the immutable configuration
//! - Engage monitors, open the session, run bootstrap routines
//! - Run the middleware chain, then dispatch to the routing/action layer
//! - Convert the response for the wire
//! - Tear everything down, whether the request succeeded or not
//! - Tell the host loop when the worker should recycle
//!
//! # Data Flow
//! ```text
//! InboundMessage
//!     → Begin:           RequestState + fresh RequestContext
//!     → Init:            monitors on, session close/bind/open, bootstrap, session close
//!     → BeforeRequest:   application.before_request
//!     → HandlingRequest: chain → (Final | dispatcher.resolve + run_action)
//!     → AfterRequest:    application.after_request
//!     → [any failure → ErrorHandler]
//!     → to_wire → OutboundMessage
//!     → End:             flush sinks, close session, monitors shut down (reverse),
//!                        uploads cleared
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::{Aliases, BridgeConfig};
use crate::error::BridgeError;
use crate::http::adapter::{to_internal, to_wire};
use crate::http::cookie::Cookie;
use crate::http::message::{InboundMessage, OutboundMessage};
use crate::http::request::RequestSettings;
use crate::lifecycle::bootstrap::Bootstrap;
use crate::lifecycle::context::RequestContext;
use crate::lifecycle::error_handler::ErrorHandler;
use crate::lifecycle::events::EventBus;
use crate::lifecycle::memory::{MemoryGuard, MemoryLimit, MemoryLimitError, MemoryProbe, ProcStatusProbe};
use crate::lifecycle::monitor::{ConnectionMonitor, EventMonitor, Monitor};
use crate::lifecycle::state::{LifecycleState, EVENT_AFTER_REQUEST, EVENT_BEFORE_REQUEST};
use crate::middleware::{Chain, ChainOutcome, Handler, HandlerRegistry, UnknownHandler};
use crate::observability::LogSink;
use crate::routing::{ActionResult, Dispatcher};
use crate::session::{MemorySessionBackend, Session, SessionBackend};

/// Application assembly failure.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    UnknownHandler(#[from] UnknownHandler),

    #[error("no bootstrap routine registered under '{0}'")]
    UnknownBootstrap(String),

    #[error(transparent)]
    MemoryLimit(#[from] MemoryLimitError),
}

/// Assembles an [`Application`].
pub struct ApplicationBuilder {
    config: Arc<BridgeConfig>,
    dispatcher: Arc<dyn Dispatcher>,
    aliases: Aliases,
    registry: HandlerRegistry,
    bootstraps: HashMap<String, Arc<dyn Bootstrap>>,
    monitors: Vec<Box<dyn Monitor>>,
    events: Option<Arc<EventBus>>,
    sessions: Option<Arc<dyn SessionBackend>>,
    sinks: Vec<Arc<dyn LogSink>>,
    probe: Option<Box<dyn MemoryProbe>>,
}

impl ApplicationBuilder {
    pub fn new(config: Arc<BridgeConfig>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            aliases: Aliases::default(),
            registry: HandlerRegistry::new(),
            bootstraps: HashMap::new(),
            monitors: Vec::new(),
            events: None,
            sessions: None,
            sinks: Vec::new(),
            probe: None,
        }
    }

    pub fn aliases(mut self, aliases: Aliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Make a chain handler available under `name`.
    pub fn handler(mut self, name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.registry.register(name, handler);
        self
    }

    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Make a bootstrap routine available under its name.
    pub fn bootstrap(mut self, routine: Arc<dyn Bootstrap>) -> Self {
        self.bootstraps.insert(routine.name().to_string(), routine);
        self
    }

    /// Add a monitor after the built-in connection and event monitors.
    pub fn monitor(mut self, monitor: Box<dyn Monitor>) -> Self {
        self.monitors.push(monitor);
        self
    }

    /// Use an existing bus (its current subscriptions stay persistent).
    pub fn events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn session_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.sessions = Some(backend);
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> Result<Application, BuildError> {
        let config = self.config;

        let chain = self.registry.build_chain(&config.middleware)?;

        let bootstraps = config
            .app
            .bootstrap
            .iter()
            .map(|name| {
                self.bootstraps
                    .get(name)
                    .cloned()
                    .ok_or_else(|| BuildError::UnknownBootstrap(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let limit = MemoryLimit::parse(&config.worker.memory_limit)?;
        let probe = self.probe.unwrap_or_else(|| Box::new(ProcStatusProbe));

        let mut monitors: Vec<Box<dyn Monitor>> =
            vec![Box::new(ConnectionMonitor::new()), Box::new(EventMonitor::new())];
        monitors.extend(self.monitors);

        let sessions = if config.session.enabled {
            Some(self.sessions.unwrap_or_else(|| {
                Arc::new(MemorySessionBackend::with_ttl(config.session.timeout()))
            }))
        } else {
            None
        };

        tracing::debug!(
            app = %config.app.id,
            chain = ?chain,
            bootstrap = bootstraps.len(),
            monitors = monitors.len(),
            memory_limit = %limit,
            sessions = sessions.is_some(),
            "Application assembled"
        );

        Ok(Application {
            settings: Arc::new(RequestSettings::from_config(&config.request, &self.aliases)),
            errors: ErrorHandler::from_config(&config.app),
            chain,
            dispatcher: self.dispatcher,
            bootstraps,
            monitors,
            events: self.events.unwrap_or_default(),
            sessions,
            sinks: self.sinks,
            memory: MemoryGuard::new(limit, probe),
            state: LifecycleState::Begin,
            handled: 0,
            config,
        })
    }
}

/// Request lifecycle controller. One per worker; handles one request at a time.
pub struct Application {
    config: Arc<BridgeConfig>,
    settings: Arc<RequestSettings>,
    chain: Chain,
    dispatcher: Arc<dyn Dispatcher>,
    bootstraps: Vec<Arc<dyn Bootstrap>>,
    monitors: Vec<Box<dyn Monitor>>,
    events: Arc<EventBus>,
    sessions: Option<Arc<dyn SessionBackend>>,
    sinks: Vec<Arc<dyn LogSink>>,
    errors: ErrorHandler,
    memory: MemoryGuard,
    state: LifecycleState,
    handled: u64,
}

impl Application {
    pub fn builder(config: Arc<BridgeConfig>, dispatcher: Arc<dyn Dispatcher>) -> ApplicationBuilder {
        ApplicationBuilder::new(config, dispatcher)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Process-wide bus; subscriptions made outside a request persist.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Requests handled by this instance.
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Handle one request end to end.
    ///
    /// Errors raised while handling are rendered into the response; an
    /// `Err` is returned only when even the error response could not be
    /// serialized. Teardown runs in every case.
    pub fn handle(&mut self, message: InboundMessage) -> Result<OutboundMessage, BridgeError> {
        let span = tracing::info_span!(
            "request",
            method = %message.method(),
            path = %message.uri().path(),
        );
        let _entered = span.enter();

        self.state = LifecycleState::Begin;
        let mut ctx = self.reset(message);

        let outcome = catch_unwind(AssertUnwindSafe(|| self.process(&mut ctx)))
            .unwrap_or_else(|payload| Err(BridgeError::Panic(panic_message(payload))));

        if let Err(error) = outcome {
            tracing::debug!(state = %self.state, error = %error, "Request failed");
            self.render_error(&error, &mut ctx);
        }

        attach_session_cookie(&mut ctx);

        let settings = self.settings.clone();
        let wire = match to_wire(&mut ctx.response, settings.signer()) {
            Ok(out) => Ok(out),
            Err(error) => {
                self.render_error(&error, &mut ctx);
                to_wire(&mut ctx.response, settings.signer())
            }
        };

        match &wire {
            Ok(out) => tracing::info!(
                request_id = %ctx.request_id(),
                status = out.status.as_u16(),
                route = ctx.request.resolved().map(|(r, _)| r.as_str()).unwrap_or("-"),
                "Request handled"
            ),
            Err(e) => tracing::error!(request_id = %ctx.request_id(), error = %e, "Response could not be serialized"),
        }

        self.teardown(ctx);
        wire
    }

    /// True when the worker should recycle (usage at 90% of the memory limit).
    /// Call after the previous request's context was dropped.
    pub fn clean(&self) -> bool {
        let recycle = self.memory.should_recycle();
        if recycle {
            tracing::info!(
                limit = %self.memory.limit(),
                handled = self.handled,
                "Memory limit approached, worker should recycle"
            );
        }
        recycle
    }

    fn reset(&mut self, message: InboundMessage) -> RequestContext {
        let request = to_internal(message, self.settings.clone());
        let session = self
            .sessions
            .as_ref()
            .map(|backend| Session::new(backend.clone(), self.config.session.name.clone()));
        let ctx = RequestContext::new(request, self.config.clone(), self.events.clone(), session);

        self.state = LifecycleState::Init;
        for monitor in &mut self.monitors {
            monitor.on(&self.events);
        }
        ctx
    }

    fn process(&mut self, ctx: &mut RequestContext) -> Result<(), BridgeError> {
        let session_id = ctx
            .request
            .cookies()
            .value(&self.config.session.name)
            .map(str::to_string);
        if let Some(session) = ctx.session() {
            session.close();
            if let Some(id) = session_id {
                session.bind_id(id);
            }
            session.open();
        }

        for routine in &self.bootstraps {
            tracing::trace!(routine = %routine.name(), "Running bootstrap");
            routine.bootstrap(ctx)?;
        }

        if let Some(session) = ctx.session() {
            session.close();
        }

        self.state = LifecycleState::BeforeRequest;
        self.events.emit(EVENT_BEFORE_REQUEST);

        self.state = LifecycleState::HandlingRequest;
        match self.chain.run(&mut ctx.request)? {
            ChainOutcome::Respond(response) => ctx.response = response,
            ChainOutcome::Proceed => self.dispatch(ctx)?,
        }

        self.state = LifecycleState::AfterRequest;
        self.events.emit(EVENT_AFTER_REQUEST);
        Ok(())
    }

    fn dispatch(&self, ctx: &mut RequestContext) -> Result<(), BridgeError> {
        let (route, params) = match ctx.request.resolved() {
            Some(resolved) => resolved.clone(),
            None => self.dispatcher.resolve(&ctx.request)?,
        };
        tracing::debug!(route = %route, "Dispatching");
        ctx.request.set_resolved(route.clone(), params.clone());

        match self.dispatcher.run_action(ctx, &route, &params)? {
            ActionResult::Response(response) => ctx.response = response,
            ActionResult::Data(data) => {
                ctx.response.set_data(data);
            }
            ActionResult::Empty => {}
        }
        Ok(())
    }

    fn render_error(&self, error: &BridgeError, ctx: &mut RequestContext) {
        let handled = catch_unwind(AssertUnwindSafe(|| {
            self.errors.handle(error, ctx, self.dispatcher.as_ref())
        }));
        if let Err(payload) = handled {
            tracing::error!(panic = %panic_message(payload), "Error handler panicked");
            ctx.response = crate::http::response::ResponseState::with_status(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            );
        }
    }

    /// Every step runs even when an earlier one panics.
    fn teardown(&mut self, mut ctx: RequestContext) {
        for sink in &self.sinks {
            guarded("log sink flush", || sink.flush());
        }
        if let Some(mut session) = ctx.take_session() {
            guarded("session close", || session.close());
        }
        let events = &self.events;
        for monitor in self.monitors.iter_mut().rev() {
            tracing::trace!(monitor = %monitor.name(), "Shutting down monitor");
            guarded("monitor shutdown", || monitor.shutdown(events));
        }
        guarded("upload cleanup", || ctx.clear_uploads());
        drop(ctx);

        self.state = LifecycleState::End;
        self.handled += 1;
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("app", &self.config.app.id)
            .field("state", &self.state)
            .field("chain", &self.chain)
            .field("handled", &self.handled)
            .finish_non_exhaustive()
    }
}

fn attach_session_cookie(ctx: &mut RequestContext) {
    let cookie = ctx
        .session()
        .filter(|s| s.is_new_id())
        .and_then(|s| s.id().map(|id| Cookie::new(s.name(), id)));
    if let Some(cookie) = cookie {
        ctx.response.add_cookie(cookie);
    }
}

fn guarded(step: &'static str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(step, panic = %panic_message(payload), "Teardown step panicked");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
