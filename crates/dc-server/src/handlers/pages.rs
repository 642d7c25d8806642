//! Page endpoint.
//!
//! Serves a cached page as HTML. `/about` and `/about.html` name the same page.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Html;

use crate::error::ServerError;
use crate::state::AppState;

/// Handle GET /{page}.
pub(crate) async fn get_page(
    State(state): State<Arc<AppState>>,
    Path(segment): Path<String>,
) -> Result<Html<String>, ServerError> {
    let Some(name) = page_name(&segment, state.store.extension()) else {
        return Err(ServerError::PageNotFound(segment));
    };

    let document = state.store.get(name).await?;
    Ok(Html(document.to_html()))
}

/// Page name for a path segment, with an optional `.{extension}` suffix removed.
///
/// Returns `None` for empty names and for names that still contain a dot.
fn page_name<'a>(segment: &'a str, extension: &str) -> Option<&'a str> {
    let name = segment
        .strip_suffix(extension)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(segment);

    (!name.is_empty() && !name.contains('.')).then_some(name)
}
