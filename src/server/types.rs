//! Request/response types for the HTTP API.
//!
//! These define the wire format for all endpoints. Clients long-poll the
//! status endpoint, so the shapes stay minimal and stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::{ChatMessage, JobOutcome};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Server status (always "ok" when healthy)
    pub status: String,
    /// Server version from Cargo.toml
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Request to submit a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    /// The user's natural-language request
    pub message: String,

    /// Current document content, if the client has one open
    #[serde(default)]
    pub document_content: Option<String>,

    /// Prior conversation turns
    #[serde(default)]
    pub chat_history: Option<Vec<ChatMessage>>,

    /// Job type tag; defaults to "general_chat"
    #[serde(default)]
    pub job_type: Option<String>,

    /// Opaque client session tag
    #[serde(default)]
    pub session_id: Option<String>,
}

impl SubmitJobRequest {
    pub const DEFAULT_JOB_TYPE: &'static str = "general_chat";

    pub fn job_type(&self) -> &str {
        self.job_type.as_deref().unwrap_or(Self::DEFAULT_JOB_TYPE)
    }
}

/// Response after submitting a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitJobResponse {
    pub job_id: String,
}

/// Response to a cancellation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Completed job result with job metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultResponse {
    #[serde(flatten)]
    pub outcome: JobOutcome,
    pub job_id: String,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Query parameters for the job listing endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ListJobsQuery {
    pub const DEFAULT_LIMIT: usize = 10;

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}

/// Response listing recent jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<crate::jobs::JobListEntry>,
    pub total: usize,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: Some(code.into()),
        }
    }
}
