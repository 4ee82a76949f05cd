//! Job processing worker.
//!
//! A long-running task that drains the submission queue and drives each job
//! through the workflow engine under an overall timeout, with retries and
//! exponential backoff. Correctness does not depend on there being exactly
//! one worker, but one is all the backend spawns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::settings::JobSettings;

use super::progress::ProgressTracker;
use super::store::{JobStore, QueuedJob, TIMEOUT_BUFFER_SECS};
use super::{Job, JobOutcome};

/// How long a dequeue waits before re-checking for shutdown.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Responses shorter than this (after trimming) are a quality fault.
const MIN_RESPONSE_CHARS: usize = 5;

const EMPTY_RESPONSE_APOLOGY: &str = "I apologize, but I'm having trouble processing your \
request right now. Please try again or rephrase your question.";

/// The worker's view of the workflow engine.
///
/// `Ok(None)` means the job was cancelled mid-flight and produced nothing to
/// record; `Err` counts as a failed attempt and is retried.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn run(
        &self,
        job: &Job,
        progress: ProgressTracker,
        cancel: CancellationToken,
    ) -> anyhow::Result<Option<JobOutcome>>;
}

/// Worker tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_attempts: u32,
    pub progress_update_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_settings(&JobSettings::default())
    }
}

impl WorkerConfig {
    pub fn from_settings(settings: &JobSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            progress_update_interval: Duration::from_secs(
                settings.progress_update_interval_seconds,
            ),
        }
    }
}

/// Dequeues submitted jobs and runs them to a terminal status.
pub struct JobWorker {
    store: Arc<JobStore>,
    runner: Arc<dyn WorkflowRunner>,
    queue: mpsc::Receiver<QueuedJob>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl JobWorker {
    pub fn new(
        store: Arc<JobStore>,
        runner: Arc<dyn WorkflowRunner>,
        queue: mpsc::Receiver<QueuedJob>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            runner,
            queue,
            config,
            shutdown,
        }
    }

    /// Spawn the worker loop onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        tracing::info!("job worker started");

        // The bounded dequeue wait doubles as the shutdown poll interval.
        while !self.shutdown.is_cancelled() {
            match tokio::time::timeout(DEQUEUE_TIMEOUT, self.queue.recv()).await {
                // Idle timeout; loop around.
                Err(_) => continue,
                // All senders dropped; the store is gone.
                Ok(None) => break,
                Ok(Some(queued)) => self.process(queued).await,
            }
        }

        tracing::info!("job worker stopped");
    }

    async fn process(&self, queued: QueuedJob) {
        let job_id = queued.job_id.as_str();

        if self.store.is_cancelled(job_id) {
            tracing::info!(job_id, "job cancelled before processing starts");
            return;
        }

        self.store
            .update_progress(job_id, 0, Some(super::JobStatus::Processing));

        let Some(job) = self.store.get(job_id) else {
            tracing::warn!(job_id, "dequeued job no longer in store");
            return;
        };
        let Some(cancel) = self.store.cancel_token(job_id) else {
            return;
        };

        let timeout_secs = job.estimated_duration_secs + TIMEOUT_BUFFER_SECS;
        let overall_timeout = Duration::from_secs(timeout_secs);

        for attempt in 0..self.config.max_attempts {
            if cancel.is_cancelled() {
                tracing::info!(job_id, "job cancelled before attempt");
                return;
            }

            let progress = ProgressTracker::new(
                self.store.clone(),
                job_id,
                self.config.progress_update_interval,
            );

            let outcome = tokio::time::timeout(
                overall_timeout,
                self.runner.run(&job, progress, cancel.clone()),
            )
            .await;

            let last_attempt = attempt + 1 >= self.config.max_attempts;
            match outcome {
                Ok(Ok(Some(mut result))) => {
                    if self.store.is_cancelled(job_id) {
                        tracing::info!(job_id, "job cancelled during execution, result discarded");
                        return;
                    }
                    validate_outcome(&mut result);
                    self.store.set_result(job_id, result);
                    tracing::info!(job_id, attempt, "job completed successfully");
                    return;
                }
                Ok(Ok(None)) => {
                    tracing::info!(job_id, "job execution yielded nothing (cancelled)");
                    return;
                }
                Ok(Err(e)) => {
                    tracing::error!(job_id, attempt, error = %e, "job execution failed");
                    if last_attempt {
                        self.store.set_error(
                            job_id,
                            format!(
                                "Job failed after {} retries: {e}",
                                self.config.max_attempts
                            ),
                        );
                        return;
                    }
                }
                Err(_) => {
                    tracing::error!(job_id, attempt, timeout_secs, "job timed out");
                    if last_attempt {
                        self.store.set_error(
                            job_id,
                            format!(
                                "Job timed out after {timeout_secs} seconds (max retries exceeded)"
                            ),
                        );
                        return;
                    }
                }
            }

            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
        }
    }
}

/// An empty response is a quality fault, not a lifecycle failure: the job
/// still completes, with an apology and `success = false`.
fn validate_outcome(outcome: &mut JobOutcome) {
    if outcome.response.trim().chars().count() < MIN_RESPONSE_CHARS {
        tracing::error!("job completed with empty or invalid response");
        outcome.response = EMPTY_RESPONSE_APOLOGY.to_string();
        outcome.success = false;
        outcome.error = Some("Empty response generated".to_string());
    }
}
