//! Demo endpoint.
//!
//! Renders the bundled `page-extension-demo` page through a store that embeds
//! every built-in script.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::state::AppState;

/// Page served by the demo endpoint.
const DEMO_PAGE: &str = "page-extension-demo";

const NOT_FOUND: &str = "<style>
html {color-scheme: light dark; font-family: sans-serif;}
</style>
<h1>Not found</h1>
<p>The demo page could not be loaded. The server's bundled assets may be missing.</p>";

/// Handle GET /dom-cache-test.
pub(crate) async fn get_demo(State(state): State<Arc<AppState>>) -> Response {
    match state.demo.get(DEMO_PAGE).await {
        Ok(document) => Html(document.to_html()).into_response(),
        Err(e) => {
            tracing::warn!(
                directory = %state.demo.directory().display(),
                error = %e,
                "Demo page unavailable"
            );
            (StatusCode::NOT_FOUND, Html(NOT_FOUND)).into_response()
        }
    }
}
