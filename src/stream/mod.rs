//! Progress poller and stream bridge.
//!
//! Drives a submitted job to a terminal state and translates what it
//! observes into chat-completion output. This is the seam between two
//! incompatible interaction models: the backend is a long-running job API
//! with no streaming semantics, the client expects either a live SSE byte
//! stream or one synchronous JSON object.
//!
//! The poll loop is a per-request state machine
//! (`Submitted -> Polling -> {Succeeded, Failed, TimedOut}`). Once
//! streaming has started every exit path ends with a terminal chunk and
//! the `[DONE]` sentinel; the connection is never dropped as the sole
//! error signal.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::catalog::MediaKind;
use crate::chat::{ChatCompletion, ChatCompletionChunk, Delta};
use crate::sora::{Job, JobStatus, SoraBackend};

/// Consecutive poll transport failures tolerated before the job is
/// declared lost.
const MAX_POLL_FAILURES: u32 = 5;

/// Stream sentinel closing every SSE response.
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Polling cadence and overall wall-clock limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Delay before the first re-poll, in milliseconds.
    pub poll_initial_ms: u64,
    /// Cap for the backoff between polls, in milliseconds.
    pub poll_max_ms: u64,
    /// Maximum wall-clock time a generation may take, in seconds.
    pub generation_timeout_secs: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_initial_ms: 1_000,
            poll_max_ms: 5_000,
            generation_timeout_secs: 600,
        }
    }
}

impl StreamSettings {
    fn poll_initial(&self) -> Duration {
        Duration::from_millis(self.poll_initial_ms)
    }

    fn poll_max(&self) -> Duration {
        Duration::from_millis(self.poll_max_ms)
    }

    fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

/// Everything the bridge needs to know about the job it is driving.
#[derive(Debug, Clone)]
pub struct BridgeJob {
    pub job: Job,
    pub model_id: String,
    pub media_kind: MediaKind,
}

/// Terminal failures of the buffered (non-streaming) path.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("generation failed: {0}")]
    Failed(String),
    #[error("generation timed out")]
    TimedOut,
}

/// Serialize one chunk as an SSE record. Stateless.
pub fn encode_chunk(chunk: &ChatCompletionChunk) -> Bytes {
    // Serialization of these fixed-shape types cannot fail.
    let json = serde_json::to_string(chunk).unwrap_or_default();
    Bytes::from(format!("data: {json}\n\n"))
}

/// Render artifact URIs as the assistant-visible message body.
fn render_results(media_kind: MediaKind, urls: &[String]) -> String {
    let mut out = String::new();
    for url in urls {
        match media_kind {
            MediaKind::Image => {
                out.push_str(&format!("![image]({url})\n"));
            }
            MediaKind::Video => {
                out.push_str(&format!("[video]({url})\n"));
            }
        }
    }
    out
}

/// Best-effort cancellation hook.
///
/// Dropped together with the response body, so a client disconnect
/// mid-stream releases the backend job without any explicit signal.
struct CancelGuard {
    backend: Arc<dyn SoraBackend>,
    job_id: String,
    armed: bool,
}

impl CancelGuard {
    fn new(backend: Arc<dyn SoraBackend>, job_id: String) -> Self {
        Self {
            backend,
            job_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            let backend = Arc::clone(&self.backend);
            let job_id = std::mem::take(&mut self.job_id);
            debug!("abandoning job {job_id}, requesting cancellation");
            tokio::spawn(async move {
                backend.cancel(&job_id).await;
            });
        }
    }
}

/// What one poll cycle resolved to.
enum PollStep {
    /// Still in flight; optional progress text to surface.
    Pending(Option<String>),
    Succeeded(Vec<String>),
    Failed(String),
}

/// Observe the job once, folding transport errors into the failure
/// counter so a flaky backend does not kill an otherwise healthy stream.
async fn poll_step(
    backend: &Arc<dyn SoraBackend>,
    job_id: &str,
    failures: &mut u32,
) -> PollStep {
    match backend.poll(job_id).await {
        Ok(update) => {
            *failures = 0;
            match update.status {
                JobStatus::Queued | JobStatus::Running => PollStep::Pending(update.progress),
                JobStatus::Succeeded => PollStep::Succeeded(update.result_urls),
                JobStatus::Failed => PollStep::Failed(
                    update
                        .error
                        .unwrap_or_else(|| "generation failed".to_string()),
                ),
            }
        }
        Err(e) => {
            *failures += 1;
            warn!("poll of job {job_id} failed ({failures}/{MAX_POLL_FAILURES}): {e}");
            if *failures >= MAX_POLL_FAILURES {
                PollStep::Failed(format!("backend unreachable: {e}"))
            } else {
                PollStep::Pending(None)
            }
        }
    }
}

/// Bridge a job into an SSE byte stream.
///
/// The returned stream yields the opening role chunk immediately, progress
/// deltas while the job runs, the artifact references on success (or an
/// error delta on failure/timeout), a terminal chunk with the finish
/// reason, and always ends with [`DONE_FRAME`].
pub fn sse_stream(
    backend: Arc<dyn SoraBackend>,
    bridge_job: BridgeJob,
    settings: StreamSettings,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let BridgeJob { job, model_id, media_kind } = bridge_job;
        let completion_id = format!("chatcmpl-{}", Uuid::new_v4().simple());
        let created = Utc::now().timestamp();
        let mut guard = CancelGuard::new(Arc::clone(&backend), job.id.clone());

        yield Ok(encode_chunk(&ChatCompletionChunk::new(
            &completion_id,
            created,
            &model_id,
            Delta { role: Some("assistant"), content: None },
        )));

        let deadline = Instant::now() + settings.generation_timeout();
        let mut interval = settings.poll_initial();
        let mut failures = 0u32;

        let finish_reason = loop {
            let now = Instant::now();
            if now >= deadline {
                yield Ok(encode_chunk(&ChatCompletionChunk::new(
                    &completion_id,
                    created,
                    &model_id,
                    Delta { role: None, content: Some("\nError: generation timed out".to_string()) },
                )));
                break "error";
            }

            match poll_step(&backend, &job.id, &mut failures).await {
                PollStep::Pending(progress) => {
                    // Heartbeat even when the backend has nothing new to
                    // say, so the connection never looks dead.
                    let content = match progress {
                        Some(p) => format!("{p}\n"),
                        None => ".".to_string(),
                    };
                    yield Ok(encode_chunk(&ChatCompletionChunk::new(
                        &completion_id,
                        created,
                        &model_id,
                        Delta { role: None, content: Some(content) },
                    )));
                }
                PollStep::Succeeded(urls) => {
                    guard.disarm();
                    yield Ok(encode_chunk(&ChatCompletionChunk::new(
                        &completion_id,
                        created,
                        &model_id,
                        Delta { role: None, content: Some(format!("\n{}", render_results(media_kind, &urls))) },
                    )));
                    break "stop";
                }
                PollStep::Failed(message) => {
                    guard.disarm();
                    yield Ok(encode_chunk(&ChatCompletionChunk::new(
                        &completion_id,
                        created,
                        &model_id,
                        Delta { role: None, content: Some(format!("\nError: {message}")) },
                    )));
                    break "error";
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(interval.min(remaining)).await;
            interval = (interval * 2).min(settings.poll_max());
        };

        yield Ok(encode_chunk(&ChatCompletionChunk::finish(
            &completion_id,
            created,
            &model_id,
            finish_reason,
        )));
        yield Ok(Bytes::from_static(DONE_FRAME));
    }
}

/// Drive a job to a terminal state and return one buffered completion.
///
/// Used for `stream: false` requests: nothing has been committed to the
/// client yet, so failures and timeouts surface as synchronous errors.
pub async fn collect_completion(
    backend: Arc<dyn SoraBackend>,
    bridge_job: BridgeJob,
    settings: StreamSettings,
) -> Result<ChatCompletion, BridgeError> {
    let BridgeJob { job, model_id, media_kind } = bridge_job;
    let completion_id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let created = Utc::now().timestamp();
    let mut guard = CancelGuard::new(Arc::clone(&backend), job.id.clone());

    let deadline = Instant::now() + settings.generation_timeout();
    let mut interval = settings.poll_initial();
    let mut failures = 0u32;

    loop {
        if Instant::now() >= deadline {
            return Err(BridgeError::TimedOut);
        }

        match poll_step(&backend, &job.id, &mut failures).await {
            PollStep::Pending(_) => {}
            PollStep::Succeeded(urls) => {
                guard.disarm();
                let content = render_results(media_kind, &urls);
                return Ok(ChatCompletion::new(&completion_id, created, &model_id, content));
            }
            PollStep::Failed(message) => {
                guard.disarm();
                return Err(BridgeError::Failed(message));
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(interval.min(remaining)).await;
        interval = (interval * 2).min(settings.poll_max());
    }
}
