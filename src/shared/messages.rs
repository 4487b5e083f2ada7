//! Progress events published while a document is processed

use uuid::Uuid;

/// What happened within a job
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Processing began
    Started { total_pages: usize },
    /// A page (zero-based) entered the pipeline
    PageStarted { page: usize },
    /// A batch of tiles came back from inference
    BatchCompleted {
        page: usize,
        completed_batches: usize,
        total_batches: usize,
    },
    /// A page produced its final table
    PageCompleted { page: usize, detections: usize },
    /// Every page finished
    Completed,
    /// Processing stopped on an error
    Failed { message: String },
}

/// Progress event tagged with its job
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub event: ProgressEvent,
}

impl JobEvent {
    pub fn new(job_id: Uuid, event: ProgressEvent) -> Self {
        Self { job_id, event }
    }
}
