//! Lazily parsed, change-watched cache of HTML pages.
//!
//! A [`DocumentStore`] serves the pages of one directory. A page named
//! `about` lives in `<directory>/about.html`; the first [`DocumentStore::get`]
//! reads and parses it, runs it through the modifier pipeline and caches
//! the result. Every read hands out a deep copy of the cached tree.
//!
//! # Pipeline
//!
//! Caller-supplied [`Modifier`]s run first, in registration order, followed
//! by the enabled built-in [`ScriptIncluder`] steps. A modifier may fetch
//! other pages through the [`ScopedLoader`] it receives; those pages are
//! parsed for that one run and never enter the cache.
//!
//! # Change watching
//!
//! With watching enabled (the default), content changes of backing files
//! trigger a background [`DocumentStore::force_reload`]. Paths matching the
//! ignore file are skipped. Created, removed and renamed files are reported
//! as [`CacheEvent::RenameUnsupported`] and need a restart.
//!
//! # Example
//!
//! ```no_run
//! use dc_cache::{CacheOptions, DocumentStore, IgnoreFile, modifier_fn};
//! use dc_dom::Element;
//!
//! # async fn run() -> Result<(), dc_cache::CacheError> {
//! let options = CacheOptions::new(IgnoreFile::Path("site/.gitignore".into()))
//!     .with_modifier(modifier_fn("header", |doc, _loader| {
//!         doc.body_mut().prepend_child(Element::new("header").with_text("My site"));
//!         Ok(())
//!     }))
//!     .with_form_handling(true);
//!
//! let store = DocumentStore::open("site", options)?;
//! let page = store.get("index").await?;
//! println!("{}", page.to_html());
//! store.stop();
//! # Ok(())
//! # }
//! ```

mod debouncer;
mod error;
mod events;
mod ignore_filter;
mod loader;
mod options;
mod pipeline;
mod scripts;
mod store;
mod watcher;

pub use error::{BoxError, CacheError};
pub use events::{CacheEvent, CacheObserver, TracingObserver};
pub use ignore_filter::IgnoreFilter;
pub use loader::Loader;
pub use options::{CacheOptions, DEFAULT_DEBOUNCE, DEFAULT_EXTENSION, ErrorReporting, IgnoreFile};
pub use pipeline::{FnModifier, Modifier, Pipeline, ScopedLoader, modifier_fn};
pub use scripts::ScriptIncluder;
pub use store::DocumentStore;
pub use watcher::{ChangeFilter, ChangeKind, ChangeWatcher, Route, WatchSubscription, classify};
