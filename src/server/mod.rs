//! HTTP transport for the orchestrator.
//!
//! A thin axum surface over the job store; tool calls take minutes, so every
//! endpoint returns immediately and clients long-poll status.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | /health | Health check |
//! | POST | /jobs | Submit a job |
//! | GET | /jobs | List recent jobs |
//! | GET | /jobs/stats | Store statistics |
//! | GET | /jobs/{job_id}/status | Poll status and progress |
//! | GET | /jobs/{job_id}/result | Fetch result (iff COMPLETED) |
//! | POST | /jobs/{job_id}/cancel | Cancel a job |

mod handlers;
pub mod types;

pub use handlers::AppState;
pub use types::{
    CancelResponse, ErrorResponse, HealthResponse, JobResultResponse, ListJobsQuery,
    ListJobsResponse, SubmitJobRequest, SubmitJobResponse,
};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::jobs::JobStore;

/// Start the HTTP server.
///
/// Returns the actual bound address (useful when `port` is 0) and a token
/// that triggers graceful shutdown when cancelled.
pub async fn start_server(
    host: &str,
    port: u16,
    store: Arc<JobStore>,
) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let shutdown_token = CancellationToken::new();
    let state = Arc::new(AppState { store });
    let app = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("HTTP server listening on {}", actual_addr);

    let server_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_token))
}

/// Create the router with all routes configured.
///
/// Separated from `start_server` for oneshot testing.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/jobs", post(handlers::submit_job))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/stats", get(handlers::stats))
        .route("/jobs/{job_id}/status", get(handlers::job_status))
        .route("/jobs/{job_id}/result", get(handlers::job_result))
        .route("/jobs/{job_id}/cancel", post(handlers::cancel_job))
        .with_state(state)
}
