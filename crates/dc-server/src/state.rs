//! Application state.
//!
//! Shared state for all request handlers.

use std::sync::Arc;

use dc_cache::DocumentStore;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Cache of the served pages.
    pub(crate) store: Arc<DocumentStore>,
    /// Cache of the bundled demo page.
    pub(crate) demo: Arc<DocumentStore>,
}
