//! HTTP gateway: job triggers, queue and audit status, source feedback,
//! config administration, and report reads. Run triggers return 202 and
//! hand the work to the queue; no handler blocks on a provider call.

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::orchestrator::Orchestrator;
use crate::queue::JobQueue;
use crate::scheduler::Scheduler;
use crate::store::Store;

/// Maximum request body size (64KB). Config prompts are text, not uploads.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout. Run triggers return immediately, so nothing here should
/// outlive a few store queries.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub queue: Arc<JobQueue>,
    pub scheduler: Arc<Scheduler>,
}

/// Run the HTTP gateway on the configured host and port.
pub async fn run_gateway(orchestrator: Arc<Orchestrator>) -> Result<()> {
    let server = &orchestrator.settings().server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    run_gateway_with_listener(listener, orchestrator).await
}

/// Run the HTTP gateway from a pre-bound listener.
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    orchestrator: Arc<Orchestrator>,
) -> Result<()> {
    let addr = listener.local_addr()?;

    let state = AppState {
        store: orchestrator.store().clone(),
        queue: Arc::clone(orchestrator.queue()),
        scheduler: Arc::clone(orchestrator.scheduler()),
    };

    tracing::info!("gateway listening on http://{addr}");
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/jobs/run/{config_id}", post(handlers::run_config))
        .route("/api/jobs/run-all", post(handlers::run_all))
        .route("/api/jobs/status", get(handlers::queue_status))
        .route("/api/audit", get(handlers::audit_log))
        .route("/api/audit/status", get(handlers::audit_status))
        .route("/api/audit/{id}", get(handlers::audit_entry))
        .route("/api/sources", get(handlers::list_sources))
        .route("/api/sources/feedback", post(handlers::submit_feedback))
        .route(
            "/api/sources/recalculate",
            post(handlers::recalculate_sources),
        )
        .route(
            "/api/configs",
            get(handlers::list_configs).post(handlers::create_config),
        )
        .route(
            "/api/configs/{id}",
            get(handlers::get_config)
                .put(handlers::update_config)
                .delete(handlers::delete_config),
        )
        .route("/api/reports", get(handlers::list_reports))
        .route("/api/reports/latest", get(handlers::latest_reports))
        .route("/api/reports/{id}", get(handlers::get_report))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}
