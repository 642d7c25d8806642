//! Cache construction options.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::events::{CacheObserver, TracingObserver};
use crate::pipeline::Modifier;

/// Default extension of backing files.
pub const DEFAULT_EXTENSION: &str = "html";

/// Default window for coalescing change events per page.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Where the ignore-pattern file lives.
///
/// There is no implicit default: callers state the location, compute it
/// once with a resolver, or opt out.
pub enum IgnoreFile {
    /// Fixed path.
    Path(PathBuf),
    /// Evaluated once while the store is opened.
    Resolver(Box<dyn FnOnce() -> PathBuf + Send>),
    /// No ignore rules.
    Disabled,
}

impl IgnoreFile {
    /// Resolve the location, running the resolver if there is one.
    #[must_use]
    pub fn resolve(self) -> Option<PathBuf> {
        match self {
            Self::Path(path) => Some(path),
            Self::Resolver(resolve) => Some(resolve()),
            Self::Disabled => None,
        }
    }
}

impl fmt::Debug for IgnoreFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
            Self::Disabled => f.write_str("Disabled"),
        }
    }
}

impl From<PathBuf> for IgnoreFile {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

/// How to treat an unreadable ignore file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorReporting {
    /// When false, the failure is reported to the observer.
    pub ignore_errors: bool,
}

/// Options for [`DocumentStore::open`](crate::DocumentStore::open).
pub struct CacheOptions {
    /// Caller-supplied pipeline steps, applied before built-in steps.
    pub modifiers: Vec<Arc<dyn Modifier>>,
    /// Embed the form-handling script.
    pub form_handling: bool,
    /// Embed the template-data script.
    pub template_data: bool,
    /// Embed the query-selector script.
    pub query_selector: bool,
    /// Ignore-pattern file location.
    pub ignore_file: IgnoreFile,
    /// Ignore-file error policy.
    pub error_reporting: ErrorReporting,
    /// Backing file extension, without the dot.
    pub extension: String,
    /// Watch the directory for changes.
    pub watch: bool,
    /// Coalescing window for change events.
    pub debounce: Duration,
    /// Receiver of absorbed failures and watcher activity.
    pub observer: Arc<dyn CacheObserver>,
}

impl CacheOptions {
    /// Options with no steps, watching enabled and the given ignore file.
    #[must_use]
    pub fn new(ignore_file: IgnoreFile) -> Self {
        Self {
            modifiers: Vec::new(),
            form_handling: false,
            template_data: false,
            query_selector: false,
            ignore_file,
            error_reporting: ErrorReporting::default(),
            extension: DEFAULT_EXTENSION.to_owned(),
            watch: true,
            debounce: DEFAULT_DEBOUNCE,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Append a caller-supplied pipeline step.
    #[must_use]
    pub fn with_modifier(mut self, modifier: impl Modifier + 'static) -> Self {
        self.modifiers.push(Arc::new(modifier));
        self
    }

    /// Enable or disable the form-handling script.
    #[must_use]
    pub fn with_form_handling(mut self, enabled: bool) -> Self {
        self.form_handling = enabled;
        self
    }

    /// Enable or disable the template-data script.
    #[must_use]
    pub fn with_template_data(mut self, enabled: bool) -> Self {
        self.template_data = enabled;
        self
    }

    /// Enable or disable the query-selector script.
    #[must_use]
    pub fn with_query_selector(mut self, enabled: bool) -> Self {
        self.query_selector = enabled;
        self
    }

    /// Set the ignore-file error policy.
    #[must_use]
    pub fn with_error_reporting(mut self, error_reporting: ErrorReporting) -> Self {
        self.error_reporting = error_reporting;
        self
    }

    /// Set the backing file extension (`"html"`, not `".html"`).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Enable or disable directory watching.
    #[must_use]
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Set the change coalescing window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the event observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field(
                "modifiers",
                &self.modifiers.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("form_handling", &self.form_handling)
            .field("template_data", &self.template_data)
            .field("query_selector", &self.query_selector)
            .field("ignore_file", &self.ignore_file)
            .field("error_reporting", &self.error_reporting)
            .field("extension", &self.extension)
            .field("watch", &self.watch)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}
