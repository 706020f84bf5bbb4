//! HTTP front server.
//!
//! # Responsibilities
//! - Create the axum Router with a single catch-all handler
//! - Wire up middleware (request id, body limit, timeout, tracing)
//! - Buffer each request into an `InboundMessage` and queue it for a worker
//! - Await the worker's `OutboundMessage` and stream it back
//!
//! # Design Decisions
//! - The server never runs application code; workers do, one request each
//! - A closed queue or a dropped reply is answered with 503

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::BridgeConfig;
use crate::http::adapter::{inbound_from_http, outbound_into_http, plain_error};
use crate::lifecycle::Shutdown;
use crate::worker::Job;

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// State injected into the handler.
#[derive(Clone)]
pub struct FrontState {
    jobs: mpsc::Sender<Job>,
    max_body_bytes: usize,
}

/// Front server feeding the worker pool.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &BridgeConfig, jobs: mpsc::Sender<Job>) -> Self {
        let state = FrontState {
            jobs,
            max_body_bytes: config.worker.max_body_bytes,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &BridgeConfig, state: FrontState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .route("/", any(bridge_handler))
            .route("/{*path}", any(bridge_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.worker.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.worker.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// The configured router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn bridge_handler(State(state): State<FrontState>, request: Request<Body>) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let message = match inbound_from_http(request, remote, state.max_body_bytes).await {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected request before dispatch");
            return plain_error(e.status());
        }
    };

    let (reply, response) = oneshot::channel();
    if state.jobs.send(Job { message, reply }).await.is_err() {
        tracing::error!("No workers accepting requests");
        return plain_error(StatusCode::SERVICE_UNAVAILABLE);
    }

    match response.await {
        Ok(out) => outbound_into_http(out),
        Err(_) => {
            tracing::error!("Worker dropped the request without responding");
            plain_error(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
