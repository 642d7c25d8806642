//! Form echo endpoint.
//!
//! Decodes a JSON or URL-encoded body and sends the fields back, as JSON by
//! default or as an HTML document with `?out=html`.

use axum::Json;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{HeaderMap, header};
use axum::response::{Html, IntoResponse, Response};
use dc_dom::{Document, Element};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ServerError;

/// Query parameters for POST /identity.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct IdentityQuery {
    /// Output format; `html` selects HTML, anything else JSON.
    out: Option<String>,
}

/// Handle POST /identity.
pub(crate) async fn identity(
    Query(query): Query<IdentityQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServerError> {
    let fields = decode_body(&headers, &body)?;

    if query.out.as_deref() == Some("html") {
        Ok(Html(render_fields(&fields).to_html()).into_response())
    } else {
        Ok(Json(fields).into_response())
    }
}

/// Decode the body by content type. Anything that is not JSON is read as a form.
fn decode_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, ServerError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let mime = content_type.split(';').next().unwrap_or_default().trim();

    if mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json") {
        if body.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        return serde_json::from_slice(body).map_err(|e| ServerError::BadRequest(e.to_string()));
    }

    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(body).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    Ok(Value::Object(collect_form(pairs)))
}

/// Form pairs as an object; a repeated key collects its values in an array.
fn collect_form(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in pairs {
        match fields.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                fields.insert(key, Value::String(value));
            }
        }
    }
    fields
}

/// One `<div><span>key</span><span>value</span></div>` row per field.
fn render_fields(fields: &Value) -> Document {
    let mut document = Document::new();
    let body = document.body_mut();

    for (key, value) in entries(fields) {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        body.append_child(
            Element::new("div")
                .with_child(Element::new("span").with_text(key))
                .with_child(Element::new("span").with_text(text)),
        );
    }

    document
}

fn entries(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Null => Vec::new(),
        scalar => vec![("value".to_owned(), scalar)],
    }
}
