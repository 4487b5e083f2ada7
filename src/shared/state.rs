//! Job status snapshots
//!
//! A snapshot is never mutated in place. Applying an event builds a new one,
//! and the registry swaps the `Arc` under its lock, so readers always see a
//! complete snapshot.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::messages::{JobEvent, ProgressEvent};

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Point-in-time view of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub total_pages: usize,
    /// One-based page being processed, 0 before the first page
    pub current_page: usize,
    /// Overall progress in percent (0 - 100)
    pub progress: f64,
}

impl JobSnapshot {
    pub fn queued(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            message: "Queued".to_string(),
            total_pages: 0,
            current_page: 0,
            progress: 0.0,
        }
    }

    /// Share of the overall progress owned by each page
    fn page_share(&self) -> f64 {
        if self.total_pages == 0 {
            0.0
        } else {
            100.0 / self.total_pages as f64
        }
    }

    /// Snapshot after `event`
    pub fn apply(&self, event: &ProgressEvent) -> Self {
        let mut next = self.clone();
        match event {
            ProgressEvent::Started { total_pages } => {
                next.status = JobStatus::Processing;
                next.total_pages = *total_pages;
                next.message = format!("Processing {} pages...", total_pages);
            }
            ProgressEvent::PageStarted { page } => {
                next.current_page = page + 1;
                next.progress = *page as f64 * next.page_share();
                next.message = format!("Processing page {} of {}...", page + 1, next.total_pages);
            }
            ProgressEvent::BatchCompleted {
                page,
                completed_batches,
                total_batches,
            } => {
                let fraction = if *total_batches == 0 {
                    1.0
                } else {
                    *completed_batches as f64 / *total_batches as f64
                };
                next.progress = (*page as f64 + fraction) * next.page_share();
                next.message = format!(
                    "Running OCR on page {} (batch {}/{})...",
                    page + 1,
                    completed_batches,
                    total_batches
                );
            }
            ProgressEvent::PageCompleted { page, detections } => {
                next.progress = (page + 1) as f64 * next.page_share();
                next.message = format!("Page {} done: {} detections", page + 1, detections);
            }
            ProgressEvent::Completed => {
                next.status = JobStatus::Completed;
                next.progress = 100.0;
                next.message = "Processing completed successfully".to_string();
            }
            ProgressEvent::Failed { message } => {
                next.status = JobStatus::Failed;
                next.message = format!("Error: {}", message);
            }
        }
        next
    }
}

/// Latest snapshot per job
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Arc<JobSnapshot>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job in the queued state
    pub fn register(&self, job_id: Uuid) -> Arc<JobSnapshot> {
        let snapshot = Arc::new(JobSnapshot::queued(job_id));
        self.jobs.write().insert(job_id, snapshot.clone());
        snapshot
    }

    pub fn get(&self, job_id: &Uuid) -> Option<Arc<JobSnapshot>> {
        self.jobs.read().get(job_id).cloned()
    }

    /// Fold an event into its job's snapshot. Unknown jobs are registered on the fly.
    pub fn apply(&self, event: &JobEvent) -> Arc<JobSnapshot> {
        let mut jobs = self.jobs.write();
        let current = jobs
            .get(&event.job_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(JobSnapshot::queued(event.job_id)));
        let next = Arc::new(current.apply(&event.event));
        jobs.insert(event.job_id, next.clone());
        next
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}
