//! Sora backend boundary.
//!
//! The generation backend is an opaque, job-based API: submit a job, poll
//! its status until it reaches a terminal state. The gateway treats it as
//! untrusted and unreliable; every failure is mapped into [`SoraError`]
//! and never propagated raw across the service boundary.

mod client;

pub use client::{HttpSora, HttpSoraConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::{MediaKind, Orientation};
use crate::chat::StoryboardSegment;

/// Backend failures, split by fault attribution.
///
/// `Client` faults are caused by the request (bad remix URL, storyboard
/// too long) and map to HTTP 400; `Backend` faults are the service's own
/// (transport errors, 5xx, malformed responses) and map to HTTP 500.
#[derive(Debug, Error)]
pub enum SoraError {
    #[error("{0}")]
    Client(String),
    #[error("{0}")]
    Backend(String),
}

/// Generation payload, one variant per intent.
#[derive(Debug, Clone)]
pub enum JobPayload {
    Prompt {
        prompt: String,
    },
    ImagePrompt {
        prompt: String,
        image_url: String,
    },
    Remix {
        source_url: String,
        instruction: String,
    },
    Storyboard {
        segments: Vec<StoryboardSegment>,
    },
}

/// A fully resolved job-creation request.
#[derive(Debug, Clone)]
pub struct SubmitJob {
    pub media_kind: MediaKind,
    pub orientation: Orientation,
    pub duration_secs: Option<f64>,
    pub payload: JobPayload,
}

/// Handle to a submitted job. Owned exclusively by the request that
/// created it; discarded once the response stream completes.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
}

/// Backend-reported job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// One poll observation.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub status: JobStatus,
    /// Incremental progress text, if the backend provided any this cycle.
    pub progress: Option<String>,
    /// Artifact URIs, populated only on `Succeeded`.
    pub result_urls: Vec<String>,
    /// Failure cause, populated only on `Failed`.
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn running() -> Self {
        Self {
            status: JobStatus::Running,
            progress: None,
            result_urls: Vec::new(),
            error: None,
        }
    }
}

/// The opaque job API the gateway drives.
///
/// Implemented by [`HttpSora`] in production and by scripted mocks in the
/// integration tests.
#[async_trait]
pub trait SoraBackend: Send + Sync {
    /// Create a generation job. Returns promptly with a handle; never
    /// waits for completion.
    async fn submit(&self, job: SubmitJob) -> Result<Job, SoraError>;

    /// Fetch the current state of a job.
    async fn poll(&self, job_id: &str) -> Result<JobUpdate, SoraError>;

    /// Ask the backend to abandon a job. Best-effort: errors are ignored
    /// by callers and the default implementation does nothing.
    async fn cancel(&self, _job_id: &str) {}
}
