//! Chat Completions protocol surface.
//!
//! Wire types for the OpenAI-compatible endpoint plus the classifier that
//! turns a free-form chat payload into a typed generation intent.

mod intent;
mod types;

pub use intent::{
    ClassifyError, GenerationIntent, REMIX_URL_PREFIX, StoryboardSegment, classify,
    parse_storyboard, split_remix_url,
};
pub use types::{
    ChatCompletion, ChatCompletionChunk, ChatMessage, ChatRequest, ChunkChoice, CompletionChoice,
    ContentPart, Delta, ImageUrl, MessageContent, ResponseMessage,
};
