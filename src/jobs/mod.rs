//! Asynchronous job queue for long-running assistant tasks.
//!
//! Tool calls routinely take minutes (LLM plus patent database round-trips),
//! so HTTP request lifetime is decoupled from task lifetime: submissions land
//! in the [`store::JobStore`], the [`worker::JobWorker`] drains them through
//! the workflow engine, and clients poll job snapshots until a terminal
//! status appears.

pub mod progress;
pub mod store;
pub mod worker;

pub use progress::ProgressTracker;
pub use store::{JobStats, JobStore, JobStoreConfig, QueuedJob};
pub use worker::{JobWorker, WorkerConfig, WorkflowRunner};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// Valid transitions: PENDING -> PROCESSING -> (COMPLETED | FAILED |
/// CANCELLED), plus PENDING -> CANCELLED. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the lowercase wire form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of conversation history supplied by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// The submission payload carried by a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub message: String,

    #[serde(default)]
    pub document_content: String,

    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
}

/// One planned step, as echoed back in job results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub step: u32,
    pub tool: String,
}

/// How the workflow ran: shape of the plan and how far it got.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_type: String,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub plan: Vec<PlanEntry>,
}

/// The assembled response record stored on a COMPLETED job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Final markdown shown to the user.
    pub response: String,

    /// Classifier verdict: "conversation", "single_tool", or "multi_step".
    pub intent_type: String,

    /// False when the workflow concluded but the content is a quality fault
    /// (e.g. an empty response replaced with an apology). Distinct from the
    /// job lifecycle status.
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub workflow: WorkflowSummary,
}

/// The central job record. Owned exclusively by the job store; everything
/// handed out is a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 0..=100; reaches 100 only on COMPLETED.
    pub progress: u8,
    pub job_type: String,
    pub request: JobRequest,
    pub result: Option<JobOutcome>,
    pub error: Option<String>,
    pub estimated_duration_secs: u64,
    pub session_id: Option<String>,
}

/// Immutable snapshot of a job's polling-relevant fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            estimated_duration: job.estimated_duration_secs,
            error: job.error.clone(),
        }
    }
}

/// Compact entry for job listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListEntry {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub progress: u8,
}
