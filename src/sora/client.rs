//! HTTP client for the Sora job API.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::catalog::{MediaKind, Orientation};

use super::{Job, JobPayload, JobStatus, JobUpdate, SoraBackend, SoraError, SubmitJob};

/// Configuration for the HTTP backend client.
#[derive(Debug, Clone)]
pub struct HttpSoraConfig {
    /// Base URL of the job API, e.g. `https://sora.example.com`.
    pub base_url: String,
    /// Bearer credential presented to the backend.
    pub token: String,
    /// Per-request timeout. Submission and polling are short calls; the
    /// long waiting happens between polls, not inside them.
    pub request_timeout: Duration,
}

/// `SoraBackend` implementation over HTTP.
pub struct HttpSora {
    config: HttpSoraConfig,
    client: reqwest::Client,
}

impl HttpSora {
    pub fn new(config: HttpSoraConfig) -> Result<Self, SoraError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SoraError::Backend(format!("building http client: {e}")))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Serialize)]
struct SubmitBody {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    orientation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remix_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    storyboard: Vec<SubmitSegment>,
}

#[derive(Debug, Serialize)]
struct SubmitSegment {
    duration_secs: f64,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    results: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

fn orientation_str(orientation: Orientation) -> Option<&'static str> {
    match orientation {
        Orientation::Landscape => Some("landscape"),
        Orientation::Portrait => Some("portrait"),
        Orientation::Square => Some("square"),
        Orientation::Unspecified => None,
    }
}

impl SubmitBody {
    fn from_job(job: SubmitJob) -> Self {
        let mut body = Self {
            kind: match job.media_kind {
                MediaKind::Image => "image",
                MediaKind::Video => "video",
            },
            orientation: orientation_str(job.orientation),
            duration_secs: job.duration_secs,
            prompt: None,
            image_url: None,
            remix_url: None,
            storyboard: Vec::new(),
        };

        match job.payload {
            JobPayload::Prompt { prompt } => body.prompt = Some(prompt),
            JobPayload::ImagePrompt { prompt, image_url } => {
                body.prompt = Some(prompt);
                body.image_url = Some(image_url);
            }
            JobPayload::Remix {
                source_url,
                instruction,
            } => {
                body.prompt = Some(instruction);
                body.remix_url = Some(source_url);
            }
            JobPayload::Storyboard { segments } => {
                body.storyboard = segments
                    .into_iter()
                    .map(|s| SubmitSegment {
                        duration_secs: s.duration_secs,
                        prompt: s.prompt,
                    })
                    .collect();
            }
        }

        body
    }
}

/// Map an error response body to a `SoraError`, attributing 4xx statuses
/// to the request and everything else to the backend.
async fn error_from_response(response: reqwest::Response) -> SoraError {
    let status = response.status();
    let detail = response
        .text()
        .await
        .ok()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| status.to_string());

    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        SoraError::Client(detail)
    } else {
        SoraError::Backend(detail)
    }
}

#[async_trait]
impl SoraBackend for HttpSora {
    async fn submit(&self, job: SubmitJob) -> Result<Job, SoraError> {
        let body = SubmitBody::from_job(job);
        debug!("submitting {} job to backend", body.kind);

        let response = self
            .client
            .post(self.url("/v1/jobs"))
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SoraError::Backend(format!("backend unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SoraError::Backend(format!("decoding submit response: {e}")))?;

        Ok(Job { id: submitted.id })
    }

    async fn poll(&self, job_id: &str) -> Result<JobUpdate, SoraError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/jobs/{job_id}")))
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| SoraError::Backend(format!("backend unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let poll: PollResponse = response
            .json()
            .await
            .map_err(|e| SoraError::Backend(format!("decoding poll response: {e}")))?;

        let status = match poll.status.as_str() {
            "queued" | "pending" => JobStatus::Queued,
            "running" | "processing" => JobStatus::Running,
            "succeeded" | "completed" => JobStatus::Succeeded,
            "failed" | "cancelled" => JobStatus::Failed,
            other => {
                // Unknown states are treated as still-running rather than
                // failing the whole stream over a vocabulary mismatch.
                warn!("unknown job status from backend: {other:?}");
                JobStatus::Running
            }
        };

        Ok(JobUpdate {
            status,
            progress: poll.progress.map(|p| format!("{}%", p.round() as i64)),
            result_urls: poll.results,
            error: poll.error,
        })
    }

    async fn cancel(&self, job_id: &str) {
        let result = self
            .client
            .post(self.url(&format!("/v1/jobs/{job_id}/cancel")))
            .bearer_auth(&self.config.token)
            .send()
            .await;

        if let Err(e) = result {
            debug!("best-effort cancel of job {job_id} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::StoryboardSegment;

    #[test]
    fn test_submit_body_for_remix() {
        let body = SubmitBody::from_job(SubmitJob {
            media_kind: MediaKind::Video,
            orientation: Orientation::Landscape,
            duration_secs: Some(10.0),
            payload: JobPayload::Remix {
                source_url: "https://sora.chatgpt.com/p/s_abc".to_string(),
                instruction: "ink wash style".to_string(),
            },
        });

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "video");
        assert_eq!(json["orientation"], "landscape");
        assert_eq!(json["remix_url"], "https://sora.chatgpt.com/p/s_abc");
        assert_eq!(json["prompt"], "ink wash style");
    }

    #[test]
    fn test_submit_body_omits_empty_fields() {
        let body = SubmitBody::from_job(SubmitJob {
            media_kind: MediaKind::Image,
            orientation: Orientation::Unspecified,
            duration_secs: None,
            payload: JobPayload::Prompt {
                prompt: "a cat".to_string(),
            },
        });

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "image");
        assert!(json.get("orientation").is_none());
        assert!(json.get("duration_secs").is_none());
        assert!(json.get("storyboard").is_none());
    }

    #[test]
    fn test_submit_body_storyboard_segments_preserve_order() {
        let body = SubmitBody::from_job(SubmitJob {
            media_kind: MediaKind::Video,
            orientation: Orientation::Unspecified,
            duration_secs: Some(15.0),
            payload: JobPayload::Storyboard {
                segments: vec![
                    StoryboardSegment {
                        duration_secs: 5.0,
                        prompt: "A".to_string(),
                    },
                    StoryboardSegment {
                        duration_secs: 10.0,
                        prompt: "B".to_string(),
                    },
                ],
            },
        });

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["storyboard"][0]["prompt"], "A");
        assert_eq!(json["storyboard"][1]["duration_secs"], 10.0);
    }
}
