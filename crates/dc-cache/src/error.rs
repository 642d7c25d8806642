//! Error types for the document cache.

use std::path::PathBuf;
use std::sync::Arc;

/// Boxed error returned by pipeline steps.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error from loading, transforming or watching pages.
///
/// Cloneable so that one shared load can hand the same failure to every
/// caller waiting on it.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    /// No backing file exists for the page.
    #[error("page `{name}` not found (path: {})", path.display())]
    NotFound {
        /// Logical page name.
        name: String,
        /// Backing file that was looked for.
        path: PathBuf,
    },

    /// The page name cannot map to a file directly inside the directory.
    #[error("invalid page name `{0}`")]
    InvalidName(String),

    /// The backing file exists but could not be read.
    #[error("failed to read {}", path.display())]
    Io {
        /// Backing file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The backing file is not parseable markup.
    #[error("failed to parse {}: {message}", path.display())]
    Parse {
        /// Backing file.
        path: PathBuf,
        /// Parser message.
        message: String,
        /// Underlying parse error.
        #[source]
        source: Arc<dc_dom::ParseError>,
    },

    /// A pipeline step failed; the page was not cached.
    #[error("modifier `{step}` failed for page `{page}`")]
    Pipeline {
        /// Page being transformed.
        page: String,
        /// Name of the failing step.
        step: String,
        /// Error raised by the step.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The filesystem watcher could not be started.
    #[error("failed to watch directory")]
    Watch(#[source] Arc<notify::Error>),

    /// Watching requires a running tokio runtime.
    #[error("no tokio runtime available to drive the change watcher")]
    NoRuntime,

    /// The load task ended without producing a result.
    #[error("load of page `{name}` was aborted")]
    Aborted {
        /// Page being loaded.
        name: String,
    },
}

impl CacheError {
    /// True for failures that mean "there is no such page" to an HTTP client.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::InvalidName(_) | Self::Parse { .. }
        )
    }

    pub(crate) fn io(path: PathBuf, err: std::io::Error) -> Self {
        Self::Io {
            path,
            source: Arc::new(err),
        }
    }

    pub(crate) fn parse(path: PathBuf, err: dc_dom::ParseError) -> Self {
        Self::Parse {
            path,
            message: err.to_string(),
            source: Arc::new(err),
        }
    }

    pub(crate) fn pipeline(page: &str, step: &str, err: BoxError) -> Self {
        Self::Pipeline {
            page: page.to_owned(),
            step: step.to_owned(),
            source: Arc::from(err),
        }
    }
}

impl From<notify::Error> for CacheError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(Arc::new(err))
    }
}
