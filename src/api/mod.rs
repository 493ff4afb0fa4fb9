//! HTTP API module.
//!
//! Provides the OpenAI-compatible endpoints and their error mapping.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
