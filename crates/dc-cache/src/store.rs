//! The keyed page cache.

use std::collections::HashMap;
use std::fmt;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dc_dom::Document;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::CacheError;
use crate::events::{CacheEvent, CacheObserver};
use crate::ignore_filter::IgnoreFilter;
use crate::loader::Loader;
use crate::options::CacheOptions;
use crate::pipeline::Pipeline;
use crate::scripts::ScriptIncluder;
use crate::watcher::{ChangeFilter, ChangeWatcher, WatchSubscription};

type LoadResult = Result<Arc<Document>, CacheError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// A cold load that later `get` calls join.
struct PendingLoad {
    id: u64,
    task: SharedLoad,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Arc<Document>>,
    pending: HashMap<String, PendingLoad>,
}

struct Inner {
    loader: Loader,
    pipeline: Pipeline,
    observer: Arc<dyn CacheObserver>,
    state: Mutex<State>,
    next_load_id: AtomicU64,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load(&self, name: &str) -> LoadResult {
        let raw = self.loader.load(name).await?;
        self.pipeline.apply(name, raw, &self.loader).await.map(Arc::new)
    }

    /// Load, transform and install `name`.
    ///
    /// A panicking step fails this load only; the slot is released either way.
    ///
    /// `pending_id` identifies the single-flight slot to release afterwards,
    /// if this load owns one.
    async fn load_and_install(
        self: Arc<Self>,
        name: String,
        pending_id: Option<u64>,
    ) -> LoadResult {
        let result = AssertUnwindSafe(self.load(&name))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::error!(page = %name, "Page load panicked");
                Err(CacheError::Aborted { name: name.clone() })
            });

        let mut state = self.state();
        if let Ok(doc) = &result {
            state.entries.insert(name.clone(), Arc::clone(doc));
        }
        if let Some(id) = pending_id
            && state.pending.get(&name).is_some_and(|p| p.id == id)
        {
            state.pending.remove(&name);
        }
        drop(state);

        match &result {
            Ok(_) => tracing::info!(page = %name, "Loaded page"),
            Err(e) => tracing::debug!(page = %name, error = %e, "Page load failed"),
        }
        result
    }

    /// Spawn a load detached from the caller, so dropping the caller's future
    /// neither cancels it nor strands the waiters joined to it.
    fn spawn_load(self: &Arc<Self>, name: &str, pending_id: Option<u64>) -> SharedLoad {
        let inner = Arc::clone(self);
        let task_name = name.to_owned();
        let handle = tokio::spawn(inner.load_and_install(task_name, pending_id));
        let name = name.to_owned();
        async move {
            handle
                .await
                .unwrap_or_else(|_| Err(CacheError::Aborted { name }))
        }
        .boxed()
        .shared()
    }

    async fn get(self: &Arc<Self>, name: &str) -> LoadResult {
        let task = {
            let mut state = self.state();
            if let Some(doc) = state.entries.get(name) {
                tracing::debug!(page = %name, "Cache hit");
                return Ok(Arc::clone(doc));
            }
            if let Some(pending) = state.pending.get(name) {
                pending.task.clone()
            } else {
                let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
                let task = self.spawn_load(name, Some(id));
                state.pending.insert(
                    name.to_owned(),
                    PendingLoad {
                        id,
                        task: task.clone(),
                    },
                );
                task
            }
        };
        task.await
    }

    async fn force_reload(self: &Arc<Self>, name: &str) -> LoadResult {
        self.spawn_load(name, None).await
    }
}

/// Lazily loaded, change-watched cache of parsed pages.
///
/// Pages are read from `<directory>/<name>.<extension>`, run through the
/// modifier pipeline once and cached. Every read returns an independent deep
/// copy, so callers may mutate what they get.
///
/// Concurrent [`get`](Self::get) calls for an uncached page share one load.
/// [`force_reload`](Self::force_reload) always starts a new load; when two
/// reloads of one page overlap, the one that finishes last is installed.
pub struct DocumentStore {
    inner: Arc<Inner>,
    watch: Mutex<Option<WatchSubscription>>,
}

impl DocumentStore {
    /// Open a store over `directory`.
    ///
    /// The ignore file is resolved and compiled here, once. With watching
    /// enabled this must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`CacheError::NoRuntime`] if watching is enabled outside a runtime
    /// - [`CacheError::Watch`] if the directory cannot be watched
    pub fn open(directory: impl AsRef<Path>, options: CacheOptions) -> Result<Self, CacheError> {
        let directory = directory.as_ref().to_path_buf();
        let CacheOptions {
            modifiers,
            form_handling,
            template_data,
            query_selector,
            ignore_file,
            error_reporting,
            extension,
            watch,
            debounce,
            observer,
        } = options;

        let mut pipeline = Pipeline::new(modifiers);
        let builtins = [
            (form_handling, ScriptIncluder::form_handling as fn() -> ScriptIncluder),
            (template_data, ScriptIncluder::template_data),
            (query_selector, ScriptIncluder::query_selector),
        ];
        for (enabled, step) in builtins {
            if enabled {
                pipeline.push(Arc::new(step()));
            }
        }

        let loader = Loader::new(&directory, &extension);
        let inner = Arc::new(Inner {
            loader,
            pipeline,
            observer: Arc::clone(&observer),
            state: Mutex::new(State::default()),
            next_load_id: AtomicU64::new(0),
        });

        let subscription = if watch {
            let ignore = match ignore_file.resolve() {
                Some(path) => {
                    IgnoreFilter::compile(&directory, &path, error_reporting, observer.as_ref())
                }
                None => IgnoreFilter::empty(),
            };
            let filter = ChangeFilter::new(&directory, extension, ignore);
            let watcher = ChangeWatcher::new(filter, debounce, observer);
            Some(watcher.start(reload_on_change(Arc::downgrade(&inner)))?)
        } else {
            None
        };

        tracing::debug!(
            directory = %directory.display(),
            steps = ?inner.pipeline,
            watch,
            "Opened document store"
        );

        Ok(Self {
            inner,
            watch: Mutex::new(subscription),
        })
    }

    /// Copy of page `name`, loading it on first use.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`], [`CacheError::Parse`] and friends from the
    /// loader, or [`CacheError::Pipeline`]. Nothing is cached on error.
    pub async fn get(&self, name: &str) -> Result<Document, CacheError> {
        let doc = self.inner.get(name).await?;
        Ok(Document::clone(&doc))
    }

    /// Reload page `name` from disk and replace any cached copy.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentStore::get`]. On error the previous entry stays.
    pub async fn force_reload(&self, name: &str) -> Result<Document, CacheError> {
        let doc = self.inner.force_reload(name).await?;
        Ok(Document::clone(&doc))
    }

    /// Stop watching the directory. Loads in progress are not affected.
    ///
    /// Safe to call more than once.
    pub fn stop(&self) {
        let subscription = self
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut subscription) = subscription {
            subscription.stop();
            tracing::debug!(directory = %self.directory().display(), "Stopped watching");
        }
    }

    /// True while the directory is watched.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Directory holding the backing files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.inner.loader.directory()
    }

    /// Backing file extension.
    #[must_use]
    pub fn extension(&self) -> &str {
        self.inner.loader.extension()
    }

    /// True if `name` has a cached entry.
    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool {
        self.inner.state().entries.contains_key(name)
    }

    /// Names of the cached pages, sorted.
    #[must_use]
    pub fn cached_pages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.state().entries.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("directory", &self.directory())
            .field("extension", &self.extension())
            .field("steps", &self.inner.pipeline)
            .field("watching", &self.is_watching())
            .finish_non_exhaustive()
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Change callback: reload the page in the background and report the outcome.
fn reload_on_change(inner: Weak<Inner>) -> impl Fn(String) -> ControlFlow<()> + Send + 'static {
    move |name| {
        let Some(inner) = inner.upgrade() else {
            return ControlFlow::Break(());
        };
        tokio::spawn(async move {
            let result = inner.force_reload(&name).await;
            let event = match result {
                Ok(_) => CacheEvent::Reloaded { name },
                Err(e) => CacheEvent::ReloadFailed {
                    name,
                    message: e.to_string(),
                },
            };
            inner.observer.observe(&event);
        });
        ControlFlow::Continue(())
    }
}
