//! Soragate library.
//!
//! Core components of the OpenAI-compatible gateway: authentication,
//! model catalog, request classification, the Sora backend boundary and
//! the poll-to-SSE stream bridge.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod chat;
pub mod sora;
pub mod stream;
