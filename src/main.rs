//! worker-bridge
//!
//! Runs the axum front server and a pool of worker threads, each with its
//! own lifecycle controller, serving a small demo route table.
//!
//! ```text
//!  client ──▶ HttpServer ──Job──▶ worker-0 … worker-N (Application)
//!         ◀──────────────OutboundMessage──────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use worker_bridge::config::{load_config, Aliases, BridgeConfig};
use worker_bridge::http::{Identity, ResponseFormat};
use worker_bridge::lifecycle::{Application, Shutdown};
use worker_bridge::middleware::{bearer_extractor, TokenAuth};
use worker_bridge::observability::{init_tracing, metrics};
use worker_bridge::routing::{ActionResult, Router};
use worker_bridge::session::{MemorySessionBackend, SessionBackend};
use worker_bridge::worker::{job_queue, AppFactory, Supervisor, WorkerExit};
use worker_bridge::HttpServer;

/// Exit status after a memory recycle, so the process manager starts a fresh
/// process (EX_TEMPFAIL).
const RECYCLE_EXIT_CODE: i32 = 75;

/// Environment variable holding the token accepted by the demo `bearer-auth` handler.
const DEMO_TOKEN_VAR: &str = "WORKER_BRIDGE_TOKEN";

#[derive(Parser)]
#[command(name = "worker-bridge")]
#[command(about = "Request lifecycle bridge for long-lived workers", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    init_tracing(&config.observability);

    tracing::info!(
        app = %config.app.id,
        bind_address = %config.listener.bind_address,
        workers = config.worker.workers,
        memory_limit = %config.worker.memory_limit,
        middleware = ?config.middleware,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let config = Arc::new(config);
    let aliases = Aliases::from_env();
    let sessions: Arc<dyn SessionBackend> =
        Arc::new(MemorySessionBackend::with_ttl(config.session.timeout()));
    let demo_token = std::env::var(DEMO_TOKEN_VAR).ok();

    let factory: AppFactory = {
        let config = config.clone();
        Arc::new(move || {
            let router = demo_router(&config);
            let token = demo_token.clone();
            let auth = TokenAuth::new(
                Arc::new(bearer_extractor()),
                Arc::new(move |candidate: &str| {
                    (token.as_deref() == Some(candidate)).then(|| Identity {
                        id: "demo".to_string(),
                        claims: Value::Null,
                    })
                }),
            );
            Application::builder(config.clone(), Arc::new(router))
                .aliases(aliases.clone())
                .handler("bearer-auth", Arc::new(auth))
                .session_backend(sessions.clone())
                .build()
        })
    };

    // Fail fast on configuration the workers could not assemble.
    factory()?;

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let (jobs_tx, jobs_rx) = job_queue(config.worker.workers * 16);
    let workers =
        Supervisor::new(config.worker.workers, factory, jobs_rx, shutdown.clone()).spawn()?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    HttpServer::new(&config, jobs_tx).run(listener, shutdown).await?;

    // The server dropped its job sender; workers drain and exit.
    let mut recycled = false;
    for handle in workers {
        match handle.join() {
            Ok(WorkerExit::Recycled) => recycled = true,
            Ok(_) => {}
            Err(_) => tracing::error!("Worker thread panicked"),
        }
    }

    if recycled {
        tracing::warn!(exit_code = RECYCLE_EXIT_CODE, "Exiting for a memory recycle");
        std::process::exit(RECYCLE_EXIT_CODE);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn demo_router(config: &BridgeConfig) -> Router {
    Router::from_config(&config.routing, config.app.default_route.clone())
        .action("site/index", |_ctx, _params| {
            Ok(ActionResult::Data(Value::from("<h1>worker-bridge</h1>")))
        })
        .action("site/get", |ctx, _params| {
            ctx.response.set_format(ResponseFormat::Json);
            Ok(ActionResult::Data(Value::Object(ctx.request.query_params().clone())))
        })
        .action("site/post", |ctx, _params| {
            ctx.response.set_format(ResponseFormat::Json);
            let body = ctx.request.body_params()?.clone();
            Ok(ActionResult::Data(Value::Object(body)))
        })
        .action("site/counter", |ctx, _params| {
            ctx.response.set_format(ResponseFormat::Json);
            let count = match ctx.session() {
                Some(session) => {
                    let next = session.get("count").and_then(Value::as_u64).unwrap_or(0) + 1;
                    session.set("count", next);
                    next
                }
                None => 0,
            };
            Ok(ActionResult::Data(json!({ "count": count })))
        })
        .action("site/whoami", |ctx, _params| {
            ctx.response.set_format(ResponseFormat::Json);
            Ok(ActionResult::Data(json!({ "identity": ctx.request.identity() })))
        })
}
