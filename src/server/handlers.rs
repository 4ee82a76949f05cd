//! HTTP request handlers.
//!
//! Each handler is a thin adapter between the wire types and the job store;
//! all orchestration lives behind the store and the worker.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::error::DocketError;
use crate::jobs::{JobRequest, JobStats, JobStatus, JobStore, JobView};

use super::types::*;

/// Application state shared across all handlers.
pub struct AppState {
    pub store: Arc<JobStore>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(job_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::with_code(
            format!("Job '{job_id}' not found"),
            "JOB_NOT_FOUND",
        )),
    )
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Submit a job.
///
/// # Response
///
/// - `202 Accepted`: job created and queued
/// - `400 Bad Request`: empty message or unknown job_type; no job created
/// - `503 Service Unavailable`: submission queue is full
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let job_type = req.job_type().to_string();
    let request = JobRequest {
        message: req.message,
        document_content: req.document_content.unwrap_or_default(),
        chat_history: req.chat_history.unwrap_or_default(),
    };

    match state.store.submit(&job_type, request, req.session_id) {
        Ok(job_id) => Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id }))),
        Err(DocketError::Validation(message)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_code(message, "VALIDATION_ERROR")),
        )),
        Err(DocketError::QueueFull) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::with_code(
                "job queue is full, try again later",
                "QUEUE_FULL",
            )),
        )),
        Err(e) => {
            tracing::error!("job submission failed: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            ))
        }
    }
}

/// Poll a job's status and progress.
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state
        .store
        .snapshot(&job_id)
        .map(Json)
        .ok_or_else(|| not_found(&job_id))
}

/// Fetch a completed job's result.
///
/// # Response
///
/// - `200 OK`: job completed; body is the assembled response
/// - `404 Not Found`: unknown job, or job not COMPLETED yet
pub async fn job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResultResponse>, ApiError> {
    let view = state.store.snapshot(&job_id).ok_or_else(|| not_found(&job_id))?;

    let outcome = state.store.result(&job_id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::with_code(
                format!("Job '{job_id}' has no result (status: {})", view.status),
                "RESULT_NOT_READY",
            )),
        )
    })?;

    Ok(Json(JobResultResponse {
        outcome,
        job_id,
        status: view.status.as_str().to_string(),
        completed_at: view.completed_at,
    }))
}

/// Cancel a job.
///
/// Always returns 200; `cancelled` is false for unknown or already-terminal
/// jobs (cancellation is idempotent).
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.store.cancel(&job_id),
    })
}

/// Job store statistics.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<JobStats> {
    Json(state.store.stats())
}

/// List recent jobs, most recent first.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let status_filter = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(JobStatus::parse(raw).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_code(
                    format!("unknown status filter: {raw}"),
                    "VALIDATION_ERROR",
                )),
            )
        })?),
    };

    let jobs = state.store.list(query.limit(), status_filter);
    let total = jobs.len();
    Ok(Json(ListJobsResponse { jobs, total }))
}
