//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::AuthState;
use crate::catalog::ModelCatalog;
use crate::sora::SoraBackend;
use crate::stream::StreamSettings;

/// Application state shared across all handlers.
///
/// Everything here is read-only after startup; concurrent requests share
/// it without locking.
#[derive(Clone)]
pub struct AppState {
    /// Authentication state.
    pub auth: AuthState,
    /// Static model catalog.
    pub catalog: Arc<ModelCatalog>,
    /// Generation backend.
    pub backend: Arc<dyn SoraBackend>,
    /// Poll cadence and generation timeout.
    pub stream: StreamSettings,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        auth: AuthState,
        catalog: ModelCatalog,
        backend: Arc<dyn SoraBackend>,
        stream: StreamSettings,
    ) -> Self {
        Self {
            auth,
            catalog: Arc::new(catalog),
            backend,
            stream,
        }
    }
}
