//! Ordered transform steps applied to freshly loaded pages.
//!
//! Every load runs the whole pipeline once, strictly in registration order,
//! before anything is cached. Steps may fetch other pages through a
//! [`ScopedLoader`]; those pages live only for the duration of one run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dc_dom::Document;

use crate::error::{BoxError, CacheError};
use crate::loader::Loader;

/// One named transform step.
#[async_trait]
pub trait Modifier: Send + Sync {
    /// Name used in error messages and logs.
    fn name(&self) -> &str;

    /// Transform `doc` in place.
    ///
    /// # Errors
    ///
    /// Any error aborts the pipeline; the page is not cached.
    async fn modify(&self, doc: &mut Document, loader: &mut ScopedLoader<'_>)
    -> Result<(), BoxError>;
}

/// A step built from a synchronous closure. See [`modifier_fn`].
pub struct FnModifier<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a [`Modifier`].
///
/// ```
/// use dc_cache::modifier_fn;
/// use dc_dom::Element;
///
/// let header = modifier_fn("header", |doc, _loader| {
///     doc.body_mut().prepend_child(Element::new("header").with_text("Site"));
///     Ok(())
/// });
/// # let _ = header;
/// ```
pub fn modifier_fn<F>(name: impl Into<String>, f: F) -> FnModifier<F>
where
    F: Fn(&mut Document, &mut ScopedLoader<'_>) -> Result<(), BoxError> + Send + Sync,
{
    FnModifier {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> Modifier for FnModifier<F>
where
    F: Fn(&mut Document, &mut ScopedLoader<'_>) -> Result<(), BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn modify(
        &self,
        doc: &mut Document,
        loader: &mut ScopedLoader<'_>,
    ) -> Result<(), BoxError> {
        (self.f)(doc, loader)
    }
}

impl<F> fmt::Debug for FnModifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModifier")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Read-through view of the backing files for one pipeline run.
///
/// Pages fetched here are parsed but never transformed, and are dropped
/// with the loader when the run ends. Nothing is written to the store.
pub struct ScopedLoader<'a> {
    loader: &'a Loader,
    side_table: HashMap<String, Document>,
}

impl<'a> ScopedLoader<'a> {
    pub(crate) fn new(loader: &'a Loader) -> Self {
        Self {
            loader,
            side_table: HashMap::new(),
        }
    }

    /// Page `name`, parsed at most once per run.
    ///
    /// # Errors
    ///
    /// Same as [`Loader::load`] when the page is not in the side table yet.
    pub async fn get(&mut self, name: &str) -> Result<&Document, CacheError> {
        if self.side_table.contains_key(name) {
            return Ok(&self.side_table[name]);
        }
        self.force_load(name).await
    }

    /// Re-read and re-parse page `name`, replacing any earlier copy.
    ///
    /// # Errors
    ///
    /// Same as [`Loader::load`].
    pub async fn force_load(&mut self, name: &str) -> Result<&Document, CacheError> {
        let doc = self.loader.load(name).await?;
        self.side_table.insert(name.to_owned(), doc);
        Ok(&self.side_table[name])
    }

    /// Number of pages held for this run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.side_table.len()
    }

    /// True if no page was fetched yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.side_table.is_empty()
    }
}

/// Caller steps followed by built-in steps.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn Modifier>>,
}

impl Pipeline {
    /// Pipeline running `steps` in order.
    #[must_use]
    pub fn new(steps: Vec<Arc<dyn Modifier>>) -> Self {
        Self { steps }
    }

    /// Append a step.
    pub fn push(&mut self, step: Arc<dyn Modifier>) {
        self.steps.push(step);
    }

    /// Step names in application order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step on `doc`, one at a time.
    ///
    /// The tree is consumed so that a failed run leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Pipeline`] naming the first failing step.
    pub async fn apply(
        &self,
        page: &str,
        mut doc: Document,
        loader: &Loader,
    ) -> Result<Document, CacheError> {
        let mut scoped = ScopedLoader::new(loader);
        for step in &self.steps {
            tracing::trace!(page, step = step.name(), "Applying modifier");
            step.modify(&mut doc, &mut scoped)
                .await
                .map_err(|e| CacheError::pipeline(page, step.name(), e))?;
        }
        Ok(doc)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.step_names()).finish()
    }
}
