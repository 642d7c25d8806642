//! Built-in steps that embed browser scripts in served pages.

use std::path::PathBuf;

use async_trait::async_trait;
use dc_dom::{Document, Element};

use crate::error::BoxError;
use crate::pipeline::{Modifier, ScopedLoader};

const FORM_HANDLING: &str = include_str!("../assets/form-handling.js");
const TEMPLATE_DATA: &str = include_str!("../assets/template-data.js");
const QUERY_SELECTOR: &str = include_str!("../assets/query-selector.js");

#[derive(Clone, Debug)]
enum Payload {
    Embedded(&'static str),
    File(PathBuf),
}

/// Inserts a `<script>` as the first element child of `head`.
#[derive(Clone, Debug)]
pub struct ScriptIncluder {
    name: String,
    payload: Payload,
}

impl ScriptIncluder {
    /// Adds `form.go`/`form.post`/... helpers to forms with an `onsubmit` attribute.
    #[must_use]
    pub fn form_handling() -> Self {
        Self::embedded("form-handling", FORM_HANDLING)
    }

    /// Adds `element.add(data)` to parents of `<template>`, filling `<slot>`s.
    #[must_use]
    pub fn template_data() -> Self {
        Self::embedded("template-data", TEMPLATE_DATA)
    }

    /// Adds the `Q`/`QA` selector shorthands.
    #[must_use]
    pub fn query_selector() -> Self {
        Self::embedded("query-selector", QUERY_SELECTOR)
    }

    /// Embed the content of `path`, read each time the step runs.
    #[must_use]
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            payload: Payload::File(path.into()),
        }
    }

    fn embedded(name: &str, script: &'static str) -> Self {
        Self {
            name: name.to_owned(),
            payload: Payload::Embedded(script),
        }
    }
}

#[async_trait]
impl Modifier for ScriptIncluder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn modify(
        &self,
        doc: &mut Document,
        _loader: &mut ScopedLoader<'_>,
    ) -> Result<(), BoxError> {
        let text = match &self.payload {
            Payload::Embedded(script) => (*script).to_owned(),
            Payload::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                format!("failed to read script {}: {e}", path.display())
            })?,
        };
        doc.head_mut()
            .prepend_child(Element::new("script").with_text(text));
        Ok(())
    }
}
