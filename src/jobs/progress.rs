//! Throttled per-step progress reporting.
//!
//! A workflow of N steps owns the 0..100 range proportionally: step k maps
//! its inner 0..100 progress into `[100*(k-1)/N, 100*k/N]`. Writes are
//! throttled to limit store contention, and the job's cancellation status is
//! consulted before every write so a cancel surfaces at the next report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::store::JobStore;

pub struct ProgressTracker {
    store: Arc<JobStore>,
    job_id: String,
    update_interval: Duration,
    start_pct: u8,
    end_pct: u8,
    last_write: Option<Instant>,
}

impl ProgressTracker {
    pub fn new(store: Arc<JobStore>, job_id: impl Into<String>, update_interval: Duration) -> Self {
        Self {
            store,
            job_id: job_id.into(),
            update_interval,
            start_pct: 0,
            end_pct: 100,
            last_write: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Re-scope the tracker to one step's share of the overall range.
    pub fn set_bounds(&mut self, start_pct: u8, end_pct: u8) {
        self.start_pct = start_pct.min(100);
        self.end_pct = end_pct.clamp(self.start_pct, 100);
    }

    /// Proportional bounds for step `k` (1-based) of `n`.
    pub fn step_bounds(k: usize, n: usize) -> (u8, u8) {
        let n = n.max(1);
        let k = k.clamp(1, n);
        let start = (100 * (k - 1) / n) as u8;
        let end = (100 * k / n) as u8;
        (start, end)
    }

    /// Report inner progress (0..=100) within the current bounds.
    ///
    /// Returns `false` when the job has been cancelled; the caller must stop.
    /// Writes more frequent than `update_interval` are dropped.
    pub fn update(&mut self, inner_pct: u8) -> bool {
        if self.store.is_cancelled(&self.job_id) {
            tracing::debug!(job_id = %self.job_id, "progress write suppressed: job cancelled");
            return false;
        }

        if let Some(last) = self.last_write {
            if last.elapsed() < self.update_interval {
                return true;
            }
        }

        self.write(inner_pct);
        true
    }

    /// Unthrottled write of the current step's end bound, for step
    /// completion. Returns `false` when the job has been cancelled.
    pub fn finish_step(&mut self) -> bool {
        if self.store.is_cancelled(&self.job_id) {
            return false;
        }

        self.write(100);
        true
    }

    fn write(&mut self, inner_pct: u8) {
        let pct = self.scale(inner_pct);
        self.store.update_progress(&self.job_id, pct, None);
        self.last_write = Some(Instant::now());
    }

    fn scale(&self, inner_pct: u8) -> u8 {
        let inner = inner_pct.min(100) as u32;
        let span = (self.end_pct - self.start_pct) as u32;
        self.start_pct + (inner * span / 100) as u8
    }
}
