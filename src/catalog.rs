//! Static model catalog.
//!
//! Maps the model identifiers accepted on the chat endpoint to generation
//! parameters. The catalog is built once at startup and is read-only
//! afterwards; handlers hold it behind an `Arc`.

use serde::Serialize;

/// What kind of media a model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Output orientation encoded in the model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
    Unspecified,
}

/// A single catalog entry.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Model id as it appears in requests and in `/v1/models`.
    pub id: String,
    pub media_kind: MediaKind,
    pub orientation: Orientation,
    /// Clip length in seconds. Only present for video models.
    pub duration_secs: Option<f64>,
    /// Human-readable description for the model listing.
    pub description: String,
}

impl ModelSpec {
    fn image(id: &str, orientation: Orientation, description: &str) -> Self {
        Self {
            id: id.to_string(),
            media_kind: MediaKind::Image,
            orientation,
            duration_secs: None,
            description: description.to_string(),
        }
    }

    fn video(id: &str, orientation: Orientation, duration_secs: f64, description: &str) -> Self {
        Self {
            id: id.to_string(),
            media_kind: MediaKind::Video,
            orientation,
            duration_secs: Some(duration_secs),
            description: description.to_string(),
        }
    }
}

/// Catalog of all models the gateway accepts.
///
/// Lookup is a case-sensitive exact match; an unknown id is rejected
/// before anything is submitted to the backend.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelSpec>,
}

impl ModelCatalog {
    /// Build the built-in catalog.
    pub fn builtin() -> Self {
        use Orientation::*;

        let models = vec![
            ModelSpec::image("sora-image", Unspecified, "Text or image to image"),
            ModelSpec::image(
                "sora-image-landscape",
                Landscape,
                "Text or image to landscape image",
            ),
            ModelSpec::image(
                "sora-image-portrait",
                Portrait,
                "Text or image to portrait image",
            ),
            ModelSpec::video("sora-video-10s", Unspecified, 10.0, "10 second video"),
            ModelSpec::video("sora-video-15s", Unspecified, 15.0, "15 second video"),
            ModelSpec::video(
                "sora-video-landscape-10s",
                Landscape,
                10.0,
                "10 second landscape video",
            ),
            ModelSpec::video(
                "sora-video-landscape-15s",
                Landscape,
                15.0,
                "15 second landscape video",
            ),
            ModelSpec::video(
                "sora-video-portrait-10s",
                Portrait,
                10.0,
                "10 second portrait video",
            ),
            ModelSpec::video(
                "sora-video-portrait-15s",
                Portrait,
                15.0,
                "15 second portrait video",
            ),
        ];

        Self { models }
    }

    /// Resolve a model id. Returns `None` for unknown ids.
    pub fn resolve(&self, id: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.id == id)
    }

    /// All catalog entries, in listing order.
    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        let catalog = ModelCatalog::builtin();

        let image = catalog.resolve("sora-image").unwrap();
        assert_eq!(image.media_kind, MediaKind::Image);
        assert_eq!(image.orientation, Orientation::Unspecified);
        assert!(image.duration_secs.is_none());

        let video = catalog.resolve("sora-video-landscape-15s").unwrap();
        assert_eq!(video.media_kind, MediaKind::Video);
        assert_eq!(video.orientation, Orientation::Landscape);
        assert_eq!(video.duration_secs, Some(15.0));
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.resolve("Sora-Image").is_none());
        assert!(catalog.resolve("sora-video").is_none());
        assert!(catalog.resolve("").is_none());
    }

    #[test]
    fn test_all_video_models_have_durations() {
        let catalog = ModelCatalog::builtin();
        for model in catalog.models() {
            match model.media_kind {
                MediaKind::Video => assert!(model.duration_secs.is_some(), "{}", model.id),
                MediaKind::Image => assert!(model.duration_secs.is_none(), "{}", model.id),
            }
        }
    }
}
