//! Filesystem change notifications for the cache directory.
//!
//! The watcher turns raw `notify` events into page names and hands them,
//! coalesced per page, to a callback running on the tokio runtime. Renames
//! are reported and otherwise dropped: a structural change of the directory
//! needs a restart.

use std::ffi::OsStr;
use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::debouncer::EventDebouncer;
use crate::error::CacheError;
use crate::events::{CacheEvent, CacheObserver};
use crate::ignore_filter::IgnoreFilter;

/// What happened to a file, as far as the cache cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// The file appeared, disappeared or changed its name.
    Renamed,
    /// The file content (or metadata) changed in place.
    ContentChanged,
}

/// Map a `notify` event kind; access and unknown events are dropped.
#[must_use]
pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            Some(ChangeKind::Renamed)
        }
        EventKind::Modify(_) => Some(ChangeKind::ContentChanged),
        _ => None,
    }
}

/// Outcome of filtering one changed path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Not relevant to the cache.
    Ignored,
    /// Structural change; reported, not handled.
    Rename(PathBuf),
    /// Page whose backing file changed.
    Reload(String),
}

/// Decides which changed paths map to pages.
#[derive(Clone, Debug)]
pub struct ChangeFilter {
    directory: PathBuf,
    extension: String,
    ignore: IgnoreFilter,
}

impl ChangeFilter {
    /// Filter for `<directory>/*.<extension>`, minus ignored files.
    #[must_use]
    pub fn new(
        directory: impl Into<PathBuf>,
        extension: impl Into<String>,
        ignore: IgnoreFilter,
    ) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
            ignore,
        }
    }

    /// Watched directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Route a change of `path`.
    ///
    /// Ignore rules are applied first, so ignored files are silent for every
    /// kind of change.
    #[must_use]
    pub fn route(&self, kind: ChangeKind, path: &Path) -> Route {
        let Some(file) = path.file_name().map(PathBuf::from) else {
            return Route::Ignored;
        };
        if self.ignore.matches(&file) {
            return Route::Ignored;
        }
        match kind {
            ChangeKind::Renamed => Route::Rename(file),
            ChangeKind::ContentChanged => {
                if file.extension() != Some(OsStr::new(&self.extension)) {
                    return Route::Ignored;
                }
                match file.file_stem().and_then(OsStr::to_str) {
                    Some(stem) if !stem.is_empty() => Route::Reload(stem.to_owned()),
                    _ => Route::Ignored,
                }
            }
        }
    }
}

/// Watches one directory and dispatches debounced page changes.
pub struct ChangeWatcher {
    filter: Arc<ChangeFilter>,
    debounce: Duration,
    observer: Arc<dyn CacheObserver>,
}

impl ChangeWatcher {
    /// Create a watcher; nothing is watched until [`ChangeWatcher::start`].
    #[must_use]
    pub fn new(
        filter: ChangeFilter,
        debounce: Duration,
        observer: Arc<dyn CacheObserver>,
    ) -> Self {
        Self {
            filter: Arc::new(filter),
            debounce,
            observer,
        }
    }

    /// Start watching.
    ///
    /// `on_change` runs on the current tokio runtime once per debounced page
    /// change. Returning [`ControlFlow::Break`] ends the dispatch loop.
    ///
    /// # Errors
    ///
    /// - [`CacheError::NoRuntime`] outside a tokio runtime
    /// - [`CacheError::Watch`] if the OS watch cannot be set up
    pub fn start<F>(self, on_change: F) -> Result<WatchSubscription, CacheError>
    where
        F: Fn(String) -> ControlFlow<()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        let debouncer = Arc::new(EventDebouncer::new(self.debounce));
        let wake = Arc::new(Notify::new());

        let mut watcher = {
            let filter = Arc::clone(&self.filter);
            let debouncer = Arc::clone(&debouncer);
            let wake = Arc::clone(&wake);
            let observer = Arc::clone(&self.observer);
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => record_event(&event, &filter, &debouncer, &wake, observer.as_ref()),
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            })?
        };
        watcher.watch(self.filter.directory(), RecursiveMode::NonRecursive)?;
        tracing::debug!(directory = %self.filter.directory().display(), "Watching for changes");

        let task = runtime.spawn(dispatch(debouncer, wake, on_change));

        Ok(WatchSubscription {
            watcher: Some(watcher),
            task: Some(task),
        })
    }
}

impl fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("filter", &self.filter)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

/// Filter one raw event and record relevant pages. Runs on the notify thread.
fn record_event(
    event: &Event,
    filter: &ChangeFilter,
    debouncer: &EventDebouncer,
    wake: &Notify,
    observer: &dyn CacheObserver,
) {
    let Some(kind) = classify(&event.kind) else {
        return;
    };
    for path in &event.paths {
        match filter.route(kind, path) {
            Route::Ignored => {
                tracing::trace!(path = %path.display(), ?kind, "Ignoring change");
            }
            Route::Rename(file) => observer.observe(&CacheEvent::RenameUnsupported { file }),
            Route::Reload(name) => {
                observer.observe(&CacheEvent::ChangeDetected { name: name.clone() });
                debouncer.record(name);
                wake.notify_one();
            }
        }
    }
}

async fn dispatch<F>(debouncer: Arc<EventDebouncer>, wake: Arc<Notify>, on_change: F)
where
    F: Fn(String) -> ControlFlow<()>,
{
    loop {
        match debouncer.next_deadline() {
            Some(deadline) => {
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            }
            None => wake.notified().await,
        }
        for name in debouncer.drain_ready() {
            if on_change(name).is_break() {
                return;
            }
        }
    }
}

/// Live OS watch plus its dispatch task.
///
/// [`WatchSubscription::stop`] releases both; it is idempotent and also runs
/// on drop. Work already handed to the callback is not cancelled.
pub struct WatchSubscription {
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl WatchSubscription {
    /// Stop watching.
    pub fn stop(&mut self) {
        self.watcher.take();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// True until [`WatchSubscription::stop`] is called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("active", &self.is_active())
            .finish()
    }
}
