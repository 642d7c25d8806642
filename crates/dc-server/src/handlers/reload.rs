//! Cache reload endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::error::ServerError;
use crate::state::AppState;

/// Response for POST /_cache/reload/{page}.
#[derive(Serialize)]
pub(crate) struct ReloadResponse {
    /// Reloaded page name.
    page: String,
    /// Title of the reloaded page, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

/// Handle POST /_cache/reload/{page}.
pub(crate) async fn reload_page(
    State(state): State<Arc<AppState>>,
    Path(page): Path<String>,
) -> Result<Json<ReloadResponse>, ServerError> {
    let document = state.store.force_reload(&page).await?;
    tracing::info!(page = %page, "Page reloaded on request");

    Ok(Json(ReloadResponse {
        title: document.title(),
        page,
    }))
}
