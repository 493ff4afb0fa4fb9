//! Test utilities and common setup.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::Router;

use soragate::api::{AppState, create_router};
use soragate::auth::{AuthConfig, AuthState};
use soragate::catalog::ModelCatalog;
use soragate::sora::{Job, JobStatus, JobUpdate, SoraBackend, SoraError, SubmitJob};
use soragate::stream::StreamSettings;

/// API key accepted by test apps.
pub const TEST_API_KEY: &str = "test-key-123";

/// Scripted backend behavior for a test.
#[derive(Debug, Clone)]
pub enum MockPlan {
    /// Report Running for `polls` cycles, then succeed with the urls.
    Succeed { polls: u32, urls: Vec<String> },
    /// Report Running for `polls` cycles, then fail with the message.
    Fail { polls: u32, message: String },
    /// Never reach a terminal state.
    Hang,
    /// Reject every submission as a request fault.
    RejectSubmission { message: String },
}

impl MockPlan {
    pub fn succeed_with(url: &str) -> Self {
        MockPlan::Succeed {
            polls: 2,
            urls: vec![url.to_string()],
        }
    }
}

/// Scripted `SoraBackend` for integration tests.
pub struct MockSora {
    plan: MockPlan,
    next_id: AtomicU64,
    poll_counts: Mutex<HashMap<String, u32>>,
}

impl MockSora {
    pub fn new(plan: MockPlan) -> Self {
        Self {
            plan,
            next_id: AtomicU64::new(1),
            poll_counts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SoraBackend for MockSora {
    async fn submit(&self, _job: SubmitJob) -> Result<Job, SoraError> {
        if let MockPlan::RejectSubmission { message } = &self.plan {
            return Err(SoraError::Client(message.clone()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Job {
            id: format!("job-{id}"),
        })
    }

    async fn poll(&self, job_id: &str) -> Result<JobUpdate, SoraError> {
        let count = {
            let mut counts = self.poll_counts.lock().unwrap();
            let entry = counts.entry(job_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        let update = match &self.plan {
            MockPlan::Succeed { polls, urls } if count > *polls => JobUpdate {
                status: JobStatus::Succeeded,
                progress: None,
                result_urls: urls.clone(),
                error: None,
            },
            MockPlan::Fail { polls, message } if count > *polls => JobUpdate {
                status: JobStatus::Failed,
                progress: None,
                result_urls: Vec::new(),
                error: Some(message.clone()),
            },
            _ => JobUpdate {
                status: JobStatus::Running,
                progress: Some(format!("{}%", (count * 30).min(99))),
                result_urls: Vec::new(),
                error: None,
            },
        };

        Ok(update)
    }
}

/// Poll settings fast enough for tests; the Hang plan hits the 1 second
/// generation timeout instead of running forever.
fn test_stream_settings() -> StreamSettings {
    StreamSettings {
        poll_initial_ms: 5,
        poll_max_ms: 20,
        generation_timeout_secs: 1,
    }
}

fn test_auth_config() -> AuthConfig {
    AuthConfig {
        api_keys: vec![TEST_API_KEY.to_string()],
        allowed_origins: Vec::new(),
    }
}

/// Create a test application with a scripted backend.
pub fn test_app(plan: MockPlan) -> Router {
    let auth_state = AuthState::new(test_auth_config());
    let catalog = ModelCatalog::builtin();
    let backend = Arc::new(MockSora::new(plan));

    let state = AppState::new(auth_state, catalog, backend, test_stream_settings());
    create_router(state)
}
