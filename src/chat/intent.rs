//! Request classification.
//!
//! A chat request overloads five different generation operations onto one
//! free-text message field. `classify` resolves them with an ordered rule
//! list over the last user message:
//!
//! 1. empty message list -> structural error
//! 2. image attachment   -> image-to-image / image-to-video
//! 3. storyboard script  -> multi-segment video
//! 4. remix URL          -> derive from a prior generation
//! 5. plain prompt       -> text-to-image / text-to-video
//!
//! Rules 2-5 are total: any content shape resolves to exactly one intent,
//! and the same input always resolves to the same variant.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::catalog::{MediaKind, ModelSpec};

use super::types::ChatMessage;

/// Canonical prefix identifying a link to a prior Sora generation.
pub const REMIX_URL_PREFIX: &str = "https://sora.chatgpt.com/p/";

/// `[<float>s]` duration marker opening a storyboard segment.
static STORYBOARD_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+(?:\.\d+)?)s\]").unwrap());

// Share ids are ASCII slugs; stopping at the first non-slug character lets
// an instruction butt directly against the URL with no separator.
static REMIX_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "{}[A-Za-z0-9_-]+",
        regex::escape(REMIX_URL_PREFIX)
    ))
    .unwrap()
});

/// One timed segment of a storyboard script.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryboardSegment {
    pub duration_secs: f64,
    pub prompt: String,
}

/// The disambiguated generation operation derived from a chat request.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationIntent {
    TextToImage {
        prompt: String,
    },
    ImageToImage {
        prompt: String,
        image_url: String,
    },
    TextToVideo {
        prompt: String,
    },
    ImageToVideo {
        prompt: String,
        image_url: String,
    },
    VideoRemix {
        source_url: String,
        instruction: String,
    },
    VideoStoryboard {
        segments: Vec<StoryboardSegment>,
    },
}

impl GenerationIntent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationIntent::TextToImage { .. } => "text_to_image",
            GenerationIntent::ImageToImage { .. } => "image_to_image",
            GenerationIntent::TextToVideo { .. } => "text_to_video",
            GenerationIntent::ImageToVideo { .. } => "image_to_video",
            GenerationIntent::VideoRemix { .. } => "video_remix",
            GenerationIntent::VideoStoryboard { .. } => "video_storyboard",
        }
    }
}

/// Structural classification failures. Content shape never errors here.
#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    #[error("messages must not be empty")]
    EmptyMessages,
}

/// Derive the generation intent for a request.
///
/// Only the last user message is considered; if the conversation carries no
/// user message at all, the last message is used as the prompt source.
pub fn classify(
    messages: &[ChatMessage],
    model: &ModelSpec,
) -> Result<GenerationIntent, ClassifyError> {
    let message = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .or_else(|| messages.last())
        .ok_or(ClassifyError::EmptyMessages)?;

    let text = message.content.text();

    if let Some(image_url) = message.content.first_image_url() {
        let image_url = image_url.to_string();
        return Ok(match model.media_kind {
            MediaKind::Image => GenerationIntent::ImageToImage {
                prompt: text,
                image_url,
            },
            MediaKind::Video => GenerationIntent::ImageToVideo {
                prompt: text,
                image_url,
            },
        });
    }

    if model.media_kind == MediaKind::Video {
        if let Some(segments) = parse_storyboard(&text) {
            return Ok(GenerationIntent::VideoStoryboard { segments });
        }

        if let Some((source_url, instruction)) = split_remix_url(&text) {
            return Ok(GenerationIntent::VideoRemix {
                source_url,
                instruction,
            });
        }
    }

    Ok(match model.media_kind {
        MediaKind::Image => GenerationIntent::TextToImage { prompt: text },
        MediaKind::Video => GenerationIntent::TextToVideo { prompt: text },
    })
}

/// Parse a storyboard script.
///
/// The text must open with a well-formed `[<float>s]` marker; each marker's
/// prompt runs until the next marker. Anything else (leading prose, a
/// malformed bracket at the start) is not a storyboard and falls through to
/// the remaining rules.
pub fn parse_storyboard(text: &str) -> Option<Vec<StoryboardSegment>> {
    let trimmed = text.trim();
    let first = STORYBOARD_MARKER.find(trimmed)?;
    if first.start() != 0 {
        return None;
    }

    let mut segments = Vec::new();
    let matches: Vec<_> = STORYBOARD_MARKER.captures_iter(trimmed).collect();

    for (i, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).unwrap();
        let duration_secs: f64 = caps[1].parse().ok()?;
        if duration_secs <= 0.0 {
            return None;
        }

        let prompt_end = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(trimmed.len());
        let prompt = trimmed[whole.end()..prompt_end].trim().to_string();

        segments.push(StoryboardSegment {
            duration_secs,
            prompt,
        });
    }

    Some(segments)
}

/// Split a remix reference out of a prompt.
///
/// Returns the asset URL and the remaining text (the remix instruction),
/// or `None` when the text carries no canonical asset link.
pub fn split_remix_url(text: &str) -> Option<(String, String)> {
    let m = REMIX_URL.find(text)?;
    let url = m.as_str().to_string();
    let mut instruction = String::new();
    instruction.push_str(text[..m.start()].trim());
    let after = text[m.end()..].trim();
    if !after.is_empty() {
        if !instruction.is_empty() {
            instruction.push(' ');
        }
        instruction.push_str(after);
    }
    Some((url, instruction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use crate::chat::types::{ContentPart, ImageUrl, MessageContent};

    fn user(text: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: MessageContent::Text(text.to_string()),
        }
    }

    fn user_with_image(text: &str, url: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: text.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: url.to_string(),
                        detail: None,
                    },
                },
            ]),
        }
    }

    fn spec(id: &str) -> ModelSpec {
        ModelCatalog::builtin().resolve(id).unwrap().clone()
    }

    #[test]
    fn test_empty_messages_is_an_error() {
        assert_eq!(
            classify(&[], &spec("sora-image")).unwrap_err(),
            ClassifyError::EmptyMessages
        );
    }

    #[test]
    fn test_plain_text_follows_media_kind() {
        let intent = classify(&[user("a cat")], &spec("sora-image")).unwrap();
        assert!(matches!(intent, GenerationIntent::TextToImage { ref prompt } if prompt == "a cat"));

        let intent = classify(&[user("a cat")], &spec("sora-video-10s")).unwrap();
        assert!(matches!(intent, GenerationIntent::TextToVideo { .. }));
    }

    #[test]
    fn test_attachment_media_kind_comes_from_model() {
        let msg = user_with_image("make it dance", "data:image/png;base64,AAAA");

        let intent = classify(std::slice::from_ref(&msg), &spec("sora-image")).unwrap();
        assert!(matches!(intent, GenerationIntent::ImageToImage { .. }));

        // Video model + image attachment is image-to-video, regardless of
        // what the attachment looks like.
        let intent = classify(&[msg], &spec("sora-video-landscape-10s")).unwrap();
        match intent {
            GenerationIntent::ImageToVideo { prompt, image_url } => {
                assert_eq!(prompt, "make it dance");
                assert_eq!(image_url, "data:image/png;base64,AAAA");
            }
            other => panic!("unexpected intent: {other:?}"),
        }
    }

    #[test]
    fn test_storyboard_round_trip() {
        let intent = classify(
            &[user("[5.0s]A [5.0s]B [10.0s]C")],
            &spec("sora-video-landscape-10s"),
        )
        .unwrap();

        match intent {
            GenerationIntent::VideoStoryboard { segments } => {
                assert_eq!(segments.len(), 3);
                let durations: Vec<f64> = segments.iter().map(|s| s.duration_secs).collect();
                assert_eq!(durations, vec![5.0, 5.0, 10.0]);
                assert_eq!(durations.iter().sum::<f64>(), 20.0);
                assert_eq!(segments[0].prompt, "A");
                assert_eq!(segments[2].prompt, "C");
            }
            other => panic!("unexpected intent: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_storyboard_falls_through() {
        // Non-numeric duration, unterminated bracket, leading prose.
        for text in ["[xs]cat runs", "[5.0s cat runs", "intro [5.0s]cat"] {
            let intent = classify(&[user(text)], &spec("sora-video-10s")).unwrap();
            assert!(
                matches!(intent, GenerationIntent::TextToVideo { .. }),
                "{text:?} should not classify as storyboard"
            );
        }
    }

    #[test]
    fn test_storyboard_only_applies_to_video_models() {
        let intent = classify(&[user("[5.0s]cat")], &spec("sora-image")).unwrap();
        assert!(matches!(intent, GenerationIntent::TextToImage { .. }));
    }

    #[test]
    fn test_remix_url_is_extracted_with_instruction() {
        let text = "https://sora.chatgpt.com/p/s_68e3a06dcd888191b150971da152c1f5 ink wash style";
        let intent = classify(&[user(text)], &spec("sora-video-landscape-10s")).unwrap();

        match intent {
            GenerationIntent::VideoRemix {
                source_url,
                instruction,
            } => {
                assert_eq!(
                    source_url,
                    "https://sora.chatgpt.com/p/s_68e3a06dcd888191b150971da152c1f5"
                );
                assert_eq!(instruction, "ink wash style");
            }
            other => panic!("unexpected intent: {other:?}"),
        }
    }

    #[test]
    fn test_remix_instruction_without_separator() {
        let text = "https://sora.chatgpt.com/p/s_68e3a06dcd888191b150971da152c1f5改成水墨画风格";
        let (url, instruction) = split_remix_url(text).unwrap();
        assert_eq!(
            url,
            "https://sora.chatgpt.com/p/s_68e3a06dcd888191b150971da152c1f5"
        );
        assert_eq!(instruction, "改成水墨画风格");
    }

    #[test]
    fn test_non_canonical_url_is_a_plain_prompt() {
        let intent = classify(
            &[user("https://example.com/video.mp4 make it blue")],
            &spec("sora-video-10s"),
        )
        .unwrap();
        assert!(matches!(intent, GenerationIntent::TextToVideo { .. }));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let messages = vec![user("[5.0s]A [5.0s]B")];
        let model = spec("sora-video-10s");
        let first = classify(&messages, &model).unwrap();
        let second = classify(&messages, &model).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_last_user_message_wins() {
        let messages = vec![
            user("old prompt"),
            ChatMessage {
                role: "assistant".to_string(),
                content: MessageContent::Text("done".to_string()),
            },
            user("new prompt"),
        ];
        let intent = classify(&messages, &spec("sora-image")).unwrap();
        assert!(
            matches!(intent, GenerationIntent::TextToImage { ref prompt } if prompt == "new prompt")
        );
    }
}
