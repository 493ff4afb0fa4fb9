//! API request handlers.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::info;

use crate::catalog::ModelSpec;
use crate::chat::{ChatRequest, GenerationIntent, classify};
use crate::sora::{JobPayload, SubmitJob};
use crate::stream::{BridgeJob, collect_completion, sse_stream};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// One entry of the model listing.
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub description: String,
}

/// Model listing response.
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

/// List available models.
///
/// GET /v1/models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let data = state
        .catalog
        .models()
        .iter()
        .map(|m| ModelInfo {
            id: m.id.clone(),
            object: "model",
            description: m.description.clone(),
        })
        .collect();

    Json(ModelList {
        object: "list",
        data,
    })
}

/// Create a chat completion backed by a generation job.
///
/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Response> {
    let model = state
        .catalog
        .resolve(&request.model)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown model: {}", request.model)))?
        .clone();

    if request.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }

    let intent = classify(&request.messages, &model)?;
    info!(
        model = %model.id,
        intent = intent.kind(),
        stream = request.stream,
        "classified generation request"
    );

    validate_intent(&intent, &model)?;

    let submit = submit_job(intent, &model);
    let job = state.backend.submit(submit).await?;

    let bridge_job = BridgeJob {
        job,
        model_id: model.id.clone(),
        media_kind: model.media_kind,
    };

    if request.stream {
        let stream = sse_stream(
            state.backend.clone(),
            bridge_job,
            state.stream.clone(),
        );
        Ok(sse_response(Body::from_stream(stream)))
    } else {
        let completion =
            collect_completion(state.backend.clone(), bridge_job, state.stream.clone()).await?;
        Ok(Json(completion).into_response())
    }
}

/// Checks that can be decided locally, before spending a job submission.
fn validate_intent(intent: &GenerationIntent, model: &ModelSpec) -> ApiResult<()> {
    if let GenerationIntent::VideoStoryboard { segments } = intent {
        let total: f64 = segments.iter().map(|s| s.duration_secs).sum();
        if let Some(max) = model.duration_secs {
            if total > max {
                return Err(ApiError::bad_request(format!(
                    "storyboard duration {total}s exceeds the {max}s limit of model {}",
                    model.id
                )));
            }
        }
    }
    Ok(())
}

/// Translate a classified intent into the backend's job-creation call.
fn submit_job(intent: GenerationIntent, model: &ModelSpec) -> SubmitJob {
    let payload = match intent {
        GenerationIntent::TextToImage { prompt } | GenerationIntent::TextToVideo { prompt } => {
            JobPayload::Prompt { prompt }
        }
        GenerationIntent::ImageToImage { prompt, image_url }
        | GenerationIntent::ImageToVideo { prompt, image_url } => {
            JobPayload::ImagePrompt { prompt, image_url }
        }
        GenerationIntent::VideoRemix {
            source_url,
            instruction,
        } => JobPayload::Remix {
            source_url,
            instruction,
        },
        GenerationIntent::VideoStoryboard { segments } => JobPayload::Storyboard { segments },
    };

    SubmitJob {
        media_kind: model.media_kind,
        orientation: model.orientation,
        duration_secs: model.duration_secs,
        payload,
    }
}

/// Build an SSE response around a chunk stream.
fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        // The builder only fails on malformed headers, and these are fixed.
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MediaKind, ModelCatalog};
    use crate::chat::StoryboardSegment;

    fn spec(id: &str) -> ModelSpec {
        ModelCatalog::builtin().resolve(id).unwrap().clone()
    }

    fn storyboard(durations: &[f64]) -> GenerationIntent {
        GenerationIntent::VideoStoryboard {
            segments: durations
                .iter()
                .map(|d| StoryboardSegment {
                    duration_secs: *d,
                    prompt: "x".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_storyboard_within_limit_is_accepted() {
        let model = spec("sora-video-15s");
        assert!(validate_intent(&storyboard(&[5.0, 5.0, 5.0]), &model).is_ok());
    }

    #[test]
    fn test_storyboard_over_limit_is_rejected() {
        let model = spec("sora-video-10s");
        let err = validate_intent(&storyboard(&[5.0, 5.0, 10.0]), &model).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_submit_job_carries_model_parameters() {
        let model = spec("sora-video-portrait-15s");
        let job = submit_job(
            GenerationIntent::TextToVideo {
                prompt: "a cat".to_string(),
            },
            &model,
        );

        assert_eq!(job.media_kind, MediaKind::Video);
        assert_eq!(job.duration_secs, Some(15.0));
        assert!(matches!(job.payload, JobPayload::Prompt { ref prompt } if prompt == "a cat"));
    }
}
