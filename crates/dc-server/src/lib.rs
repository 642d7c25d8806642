//! HTTP server for dom-cache pages.
//!
//! Serves every page of one directory through a [`DocumentStore`]:
//! - `GET /` renders `page-index` or `index`, falling back to a file listing
//! - `GET /{page}` and `GET /{page}.html` render a cached page
//! - `POST /identity` echoes a submitted form as JSON or HTML
//! - `POST /_cache/reload/{page}` forces a page to be re-read
//! - `GET /dom-cache-test` renders the bundled demo page with every script
//!
//! # Quick Start
//!
//! ```ignore
//! use dc_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         directory: "site".into(),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```

mod app;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dc_cache::{CacheOptions, DEFAULT_DEBOUNCE, DEFAULT_EXTENSION, DocumentStore, ErrorReporting, IgnoreFile};
use state::AppState;

/// Directory holding the bundled demo page.
pub const DEMO_DIRECTORY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets");

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory holding the pages.
    pub directory: PathBuf,
    /// Page file extension, without the dot.
    pub extension: String,
    /// Ignore-pattern file (`None` disables ignore rules).
    pub ignore_file: Option<PathBuf>,
    /// Stay silent when the ignore file cannot be read.
    pub ignore_errors: bool,
    /// Embed the form-handling script.
    pub form_handling: bool,
    /// Embed the template-data script.
    pub template_js_data: bool,
    /// Embed the query-selector script.
    pub query_selector: bool,
    /// Reload pages when their files change.
    pub watch: bool,
    /// Change coalescing window.
    pub debounce: Duration,
    /// Directory holding `page-extension-demo`.
    pub demo_directory: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9000,
            directory: PathBuf::from("."),
            extension: DEFAULT_EXTENSION.to_owned(),
            ignore_file: None,
            ignore_errors: false,
            form_handling: true,
            template_js_data: true,
            query_selector: true,
            watch: true,
            debounce: DEFAULT_DEBOUNCE,
            demo_directory: PathBuf::from(DEMO_DIRECTORY),
        }
    }
}

impl ServerConfig {
    /// Cache options matching this configuration.
    #[must_use]
    pub fn cache_options(&self) -> CacheOptions {
        let ignore_file = match &self.ignore_file {
            Some(path) => IgnoreFile::Path(path.clone()),
            None => IgnoreFile::Disabled,
        };

        CacheOptions::new(ignore_file)
            .with_extension(self.extension.clone())
            .with_error_reporting(ErrorReporting {
                ignore_errors: self.ignore_errors,
            })
            .with_form_handling(self.form_handling)
            .with_template_data(self.template_js_data)
            .with_query_selector(self.query_selector)
            .with_watch(self.watch)
            .with_debounce(self.debounce)
    }
}

/// Cache options for the demo store: every built-in script, no watcher.
pub(crate) fn demo_cache_options() -> CacheOptions {
    CacheOptions::new(IgnoreFile::Disabled)
        .with_form_handling(true)
        .with_template_data(true)
        .with_query_selector(true)
        .with_watch(false)
}

/// Run the server.
///
/// # Arguments
///
/// * `config` - Server configuration
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the server fails to start.
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(DocumentStore::open(&config.directory, config.cache_options())?);
    tracing::info!(
        directory = %store.directory().display(),
        watching = store.is_watching(),
        "Opened page store"
    );

    let demo = DocumentStore::open(&config.demo_directory, demo_cache_options())?;

    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        demo: Arc::new(demo),
    });
    let app = app::create_router(state);

    let addr = SocketAddr::from_str(&format!("{}:{}", config.host, config.port))?;
    tracing::info!(address = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    store.stop();
    served?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from application config.
#[must_use]
pub fn server_config_from_config(config: &dc_config::Config) -> ServerConfig {
    let cache = &config.cache_resolved;

    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        directory: cache.directory.clone(),
        extension: cache.extension.clone(),
        ignore_file: Some(cache.ignore_file.clone()),
        ignore_errors: cache.ignore_errors,
        form_handling: cache.form_handling,
        template_js_data: cache.template_js_data,
        query_selector: cache.query_selector,
        watch: cache.watch,
        debounce: Duration::from_millis(cache.debounce_ms),
        ..ServerConfig::default()
    }
}
