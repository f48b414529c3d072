//! HTTP server: route table, shared state and the serve loop.

pub mod handlers;
pub mod params;
pub mod render;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::docker::DockerClient;
use crate::policy::Policy;
use crate::runner::{CommandRunner, ProcessRunner};
use crate::shadow::Reconciler;

pub struct AppState {
    pub config: Arc<Config>,
    pub client: Arc<DockerClient>,
    pub policy: Policy,
    pub reconciler: Arc<Reconciler>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire up the component graph for a given runner. Tests inject a
    /// scripted runner here; the daemon uses [`ProcessRunner`].
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> SharedState {
        let config = Arc::new(config);
        let client = Arc::new(DockerClient::new(runner, &config));
        let policy = Policy::new(config.policy.clone());
        let reconciler = Arc::new(Reconciler::new(client.clone(), &config));
        Arc::new(AppState {
            config,
            client,
            policy,
            reconciler,
        })
    }
}

/// The complete route table. Static routes win over the `{unit}/{action}`
/// pattern, so `system`, `network` and `proxy` are effectively reserved
/// unit names.
pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.body_limit;
    Router::new()
        .route("/api/help", get(handlers::help))
        .route("/api/healthz", get(handlers::healthz))
        .route(
            "/api/system/{command}",
            get(handlers::system_op).post(handlers::system_op),
        )
        .route(
            "/api/network/status",
            get(handlers::network_status).post(handlers::network_status),
        )
        .route(
            "/api/network/ping",
            get(handlers::network_ping).post(handlers::network_ping),
        )
        .route(
            "/api/network/address",
            get(handlers::network_address).post(handlers::network_address),
        )
        .route(
            "/api/proxy/test",
            get(handlers::proxy_test).post(handlers::proxy_test),
        )
        .route(
            "/api/proxy/reload",
            get(handlers::proxy_reload).post(handlers::proxy_reload),
        )
        .route(
            "/api/proxy/version",
            get(handlers::proxy_version).post(handlers::proxy_version),
        )
        .route(
            "/api/proxy/logs/{kind}",
            get(handlers::proxy_logs).post(handlers::proxy_logs),
        )
        .route(
            "/api/{unit}/{action}",
            get(handlers::unit_op).post(handlers::unit_op),
        )
        .fallback(handlers::fallback)
        .layer(axum::middleware::from_fn(log_requests))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Method, path, status and elapsed time for every request.
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    info!(
        target: "http",
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Run the daemon: HTTP server plus the background reconciler.
pub async fn serve(config: Config) -> Result<()> {
    let listen = config.listen;
    let state = AppState::new(config, Arc::new(ProcessRunner));

    let sync_task = tokio::spawn(state.reconciler.clone().run_loop());

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!("listening on {listen}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    sync_task.abort();
    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to install interrupt handler: {err}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install terminate handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("interrupt received, shutting down"),
        _ = terminate => info!("terminate received, shutting down"),
    }
}
