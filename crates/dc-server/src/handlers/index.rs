//! Root endpoint.
//!
//! Renders the first existing index page, or lists the page files of the
//! served directory when there is none.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use dc_dom::{Document, Element};

use crate::error::ServerError;
use crate::state::AppState;

/// Pages tried, in order, for the root path.
const INDEX_PAGES: [&str; 2] = ["page-index", "index"];

/// Handle GET /.
pub(crate) async fn get_index(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, ServerError> {
    for name in INDEX_PAGES {
        match state.store.get(name).await {
            Ok(document) => return Ok(Html(document.to_html())),
            Err(e) if e.is_not_found() => {
                tracing::debug!(page = name, error = %e, "Index page unavailable");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let files = page_files(state.store.directory(), state.store.extension()).await?;
    Ok(Html(listing(&files).to_html()))
}

/// Sorted names of the regular files in `directory` ending in `.{extension}`.
async fn page_files(directory: &Path, extension: &str) -> std::io::Result<Vec<String>> {
    let suffix = format!(".{extension}");
    let mut files = Vec::new();

    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string()
            && name.len() > suffix.len()
            && name.ends_with(&suffix)
        {
            files.push(name);
        }
    }

    files.sort();
    Ok(files)
}

/// Document linking to each file.
fn listing(files: &[String]) -> Document {
    let mut document = Document::new();
    document
        .head_mut()
        .append_child(Element::new("title").with_text("Pages"));

    let body = document.body_mut();
    for file in files {
        body.append_child(Element::new("a").with_attr("href", file.as_str()).with_text(file.as_str()));
        body.append_child(Element::new("br"));
    }

    document
}
