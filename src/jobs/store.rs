//! In-memory job store with TTL eviction.
//!
//! The store is split into two layers:
//!
//! - [`JobMap`]: the id -> job map plus cleanup bookkeeping, protected by a
//!   single plain mutex and exposing only small atomic primitives. The lock
//!   is never held across I/O or await points.
//! - [`JobStore`]: the outer API (submission, snapshots, lifecycle writes,
//!   eviction, stats) composing those primitives.
//!
//! Every job also carries a `CancellationToken`; `cancel()` flips the status
//! and fires the token so the executor can abandon in-flight work.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::DocketError;
use crate::settings::JobSettings;

use super::{Job, JobListEntry, JobOutcome, JobRequest, JobStatus, JobView};

/// Extra wall-clock allowance on top of the per-type estimate.
pub const TIMEOUT_BUFFER_SECS: u64 = 60;

/// Configuration for the job store.
#[derive(Debug, Clone)]
pub struct JobStoreConfig {
    /// Upper bound for the store before forced eviction.
    pub max_jobs: usize,
    /// Maximum age of any terminal job.
    pub job_ttl: Duration,
    /// Maximum age of completed/failed/cancelled jobs.
    pub terminal_job_ttl: Duration,
    /// Minimum gap between eviction passes.
    pub cleanup_interval: Duration,
    /// Estimated duration per job type, in seconds.
    pub estimates: BTreeMap<String, u64>,
    /// Estimate for configured job types not listed in `estimates`.
    pub default_estimate_secs: u64,
    /// Capacity of the submission queue.
    pub queue_capacity: usize,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self::from_settings(&JobSettings::default())
    }
}

impl JobStoreConfig {
    pub fn from_settings(settings: &JobSettings) -> Self {
        Self {
            max_jobs: settings.max_jobs,
            job_ttl: Duration::from_secs(settings.job_ttl_seconds),
            terminal_job_ttl: Duration::from_secs(settings.terminal_job_ttl_seconds),
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_seconds),
            estimates: settings.estimates.clone(),
            default_estimate_secs: settings.default_estimate_seconds,
            queue_capacity: settings.queue_capacity,
        }
    }
}

/// Queue entry handed to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: String,
    pub job_type: String,
}

/// Job store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub total_jobs: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub max_jobs: usize,
    pub job_ttl: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cleanup: Option<DateTime<Utc>>,
}

struct JobEntry {
    job: Job,
    cancel: CancellationToken,
    /// Monotonic insertion counter; orders listings and capacity eviction.
    seq: u64,
}

/// Inner layer: the map plus cleanup bookkeeping. All methods are O(n) at
/// worst and never block on anything but the surrounding mutex.
#[derive(Default)]
struct JobMap {
    jobs: HashMap<String, JobEntry>,
    next_seq: u64,
    last_cleanup: Option<DateTime<Utc>>,
}

impl JobMap {
    fn insert(&mut self, job: Job) -> CancellationToken {
        let token = CancellationToken::new();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.jobs.insert(
            job.id.clone(),
            JobEntry {
                job,
                cancel: token.clone(),
                seq,
            },
        );
        token
    }

    fn remove(&mut self, job_id: &str) -> Option<JobEntry> {
        self.jobs.remove(job_id)
    }

    fn get(&self, job_id: &str) -> Option<&JobEntry> {
        self.jobs.get(job_id)
    }

    fn get_mut(&mut self, job_id: &str) -> Option<&mut JobEntry> {
        self.jobs.get_mut(job_id)
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}

/// Process-wide collection of jobs keyed by id.
pub struct JobStore {
    inner: Mutex<JobMap>,
    queue_tx: mpsc::Sender<QueuedJob>,
    config: JobStoreConfig,
}

impl JobStore {
    /// Create a store and the receiving end of its submission queue.
    pub fn new(config: JobStoreConfig) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let store = Self {
            inner: Mutex::new(JobMap::default()),
            queue_tx,
            config,
        };
        (store, queue_rx)
    }

    pub fn config(&self) -> &JobStoreConfig {
        &self.config
    }

    /// Estimated duration for a job type, in seconds.
    pub fn estimate_duration(&self, job_type: &str) -> u64 {
        self.config
            .estimates
            .get(job_type)
            .copied()
            .unwrap_or(self.config.default_estimate_secs)
    }

    /// True when `job_type` is accepted at submission.
    pub fn is_known_job_type(&self, job_type: &str) -> bool {
        self.config.estimates.contains_key(job_type)
    }

    /// Create a PENDING job, enqueue it for the worker, and return its id.
    ///
    /// Validation failures and a full queue are reported synchronously and
    /// leave no job behind.
    pub fn submit(
        &self,
        job_type: &str,
        request: JobRequest,
        session_id: Option<String>,
    ) -> Result<String, DocketError> {
        if request.message.trim().is_empty() {
            return Err(DocketError::Validation(
                "message must not be empty".to_string(),
            ));
        }
        if !self.is_known_job_type(job_type) {
            return Err(DocketError::Validation(format!(
                "unknown job_type: {job_type}"
            )));
        }

        self.maybe_evict();

        let job_id = Uuid::new_v4().to_string();
        let job = Job {
            id: job_id.clone(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            job_type: job_type.to_string(),
            request,
            result: None,
            error: None,
            estimated_duration_secs: self.estimate_duration(job_type),
            session_id,
        };

        self.inner.lock().insert(job);

        let queued = QueuedJob {
            job_id: job_id.clone(),
            job_type: job_type.to_string(),
        };
        if self.queue_tx.try_send(queued).is_err() {
            // Keep submission atomic: no queued entry means no job.
            self.inner.lock().remove(&job_id);
            return Err(DocketError::QueueFull);
        }

        tracing::info!(%job_id, job_type, "job submitted");
        Ok(job_id)
    }

    /// Full copy of a job record.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.inner.lock().get(job_id).map(|entry| entry.job.clone())
    }

    /// Immutable snapshot for polling clients.
    pub fn snapshot(&self, job_id: &str) -> Option<JobView> {
        self.inner
            .lock()
            .get(job_id)
            .map(|entry| JobView::from(&entry.job))
    }

    /// The assembled result, iff the job is COMPLETED.
    pub fn result(&self, job_id: &str) -> Option<JobOutcome> {
        let inner = self.inner.lock();
        let entry = inner.get(job_id)?;
        if entry.job.status != JobStatus::Completed {
            return None;
        }
        entry.job.result.clone()
    }

    /// Update progress and optionally transition status.
    ///
    /// The only status transition accepted here is PENDING -> PROCESSING
    /// (which stamps `started_at` exactly once). Terminal jobs are never
    /// touched; progress writes are clamped non-decreasing.
    pub fn update_progress(&self, job_id: &str, progress: u8, status: Option<JobStatus>) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.get_mut(job_id) else {
            return;
        };
        if entry.job.status.is_terminal() {
            return;
        }

        if let Some(next) = status {
            if next == JobStatus::Processing {
                if entry.job.status == JobStatus::Pending {
                    entry.job.status = JobStatus::Processing;
                }
                if entry.job.started_at.is_none() {
                    entry.job.started_at = Some(Utc::now());
                }
            }
        }

        // 100 is reserved for set_result: progress reaches 100 iff COMPLETED.
        entry.job.progress = entry.job.progress.max(progress.min(99));
    }

    /// Transition to COMPLETED with the assembled result.
    pub fn set_result(&self, job_id: &str, result: JobOutcome) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.get_mut(job_id) else {
            return;
        };
        if entry.job.status.is_terminal() {
            return;
        }

        entry.job.result = Some(result);
        entry.job.status = JobStatus::Completed;
        entry.job.completed_at = Some(Utc::now());
        entry.job.progress = 100;
    }

    /// Transition to FAILED with a human-readable message.
    pub fn set_error(&self, job_id: &str, error: impl Into<String>) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.get_mut(job_id) else {
            return;
        };
        if entry.job.status.is_terminal() {
            return;
        }

        entry.job.error = Some(error.into());
        entry.job.status = JobStatus::Failed;
        entry.job.completed_at = Some(Utc::now());
    }

    /// Cancel a job if it is not already terminal.
    ///
    /// Returns `true` exactly once per job; cancelling a terminal job is a
    /// non-mutating no-op returning `false`.
    pub fn cancel(&self, job_id: &str) -> bool {
        let token = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.get_mut(job_id) else {
                tracing::warn!(job_id, "job not found for cancellation");
                return false;
            };
            if entry.job.status.is_terminal() {
                tracing::debug!(job_id, status = %entry.job.status, "job already in final state");
                return false;
            }

            entry.job.status = JobStatus::Cancelled;
            entry.job.completed_at = Some(Utc::now());
            entry.cancel.clone()
        };

        // Fire the token outside the lock; waiters may run arbitrary code.
        token.cancel();
        tracing::info!(job_id, "job cancelled");
        true
    }

    pub fn is_cancelled(&self, job_id: &str) -> bool {
        self.inner
            .lock()
            .get(job_id)
            .map(|entry| entry.job.status == JobStatus::Cancelled)
            .unwrap_or(false)
    }

    /// The job's cancellation token, for threading through the executor.
    pub fn cancel_token(&self, job_id: &str) -> Option<CancellationToken> {
        self.inner.lock().get(job_id).map(|entry| entry.cancel.clone())
    }

    /// Store statistics.
    pub fn stats(&self) -> JobStats {
        let inner = self.inner.lock();
        let mut status_counts = BTreeMap::new();
        for entry in inner.jobs.values() {
            *status_counts
                .entry(entry.job.status.as_str().to_string())
                .or_insert(0) += 1;
        }

        JobStats {
            total_jobs: inner.len(),
            status_counts,
            max_jobs: self.config.max_jobs,
            job_ttl: self.config.job_ttl.as_secs(),
            last_cleanup: inner.last_cleanup,
        }
    }

    /// Most-recent-first listing, optionally filtered by status.
    pub fn list(&self, limit: usize, status_filter: Option<JobStatus>) -> Vec<JobListEntry> {
        let inner = self.inner.lock();
        let mut entries: Vec<&JobEntry> = inner
            .jobs
            .values()
            .filter(|entry| status_filter.map_or(true, |s| entry.job.status == s))
            .collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));

        entries
            .into_iter()
            .take(limit)
            .map(|entry| JobListEntry {
                job_id: entry.job.id.clone(),
                status: entry.job.status,
                created_at: entry.job.created_at,
                progress: entry.job.progress,
            })
            .collect()
    }

    /// Evict old jobs, at most once per `cleanup_interval`.
    ///
    /// Three passes: terminal jobs past `job_ttl`, terminal jobs past
    /// `terminal_job_ttl`, then oldest-first terminal jobs until the store is
    /// within `max_jobs`. Non-terminal jobs are never deleted regardless of
    /// age; a pathological configuration must not lose live tasks.
    fn maybe_evict(&self) {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        if let Some(last) = inner.last_cleanup {
            let elapsed = (now - last).to_std().unwrap_or_default();
            if elapsed < self.config.cleanup_interval {
                return;
            }
        }
        inner.last_cleanup = Some(now);

        let expired: Vec<String> = inner
            .jobs
            .values()
            .filter(|entry| {
                if !entry.job.status.is_terminal() {
                    return false;
                }
                let age = (now - entry.job.created_at).to_std().unwrap_or_default();
                age > self.config.job_ttl || age > self.config.terminal_job_ttl
            })
            .map(|entry| entry.job.id.clone())
            .collect();

        let removed_expired = expired.len();
        for job_id in expired {
            inner.remove(&job_id);
            tracing::debug!(%job_id, "cleaned up expired job");
        }

        let mut removed_for_cap = 0;
        if inner.len() > self.config.max_jobs {
            let mut terminal: Vec<(u64, String)> = inner
                .jobs
                .values()
                .filter(|entry| entry.job.status.is_terminal())
                .map(|entry| (entry.seq, entry.job.id.clone()))
                .collect();
            terminal.sort();

            let excess = inner.len() - self.config.max_jobs;
            for (_, job_id) in terminal.into_iter().take(excess) {
                inner.remove(&job_id);
                removed_for_cap += 1;
            }
        }

        if removed_expired > 0 || removed_for_cap > 0 {
            tracing::info!(
                total_jobs = inner.len(),
                removed_expired,
                removed_for_cap,
                "job cleanup completed"
            );
        }
    }

    /// Rewind a job's creation time (eviction tests).
    #[cfg(test)]
    pub(crate) fn backdate_job(&self, job_id: &str, created_at: DateTime<Utc>) {
        if let Some(entry) = self.inner.lock().get_mut(job_id) {
            entry.job.created_at = created_at;
        }
    }

    /// Allow the next submit to run an eviction pass immediately.
    #[cfg(test)]
    pub(crate) fn force_next_cleanup(&self) {
        self.inner.lock().last_cleanup = None;
    }
}
