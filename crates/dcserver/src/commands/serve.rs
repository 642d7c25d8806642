//! `dcserver serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use dc_config::{CliSettings, Config};
use dc_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover dcserver.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of pages to serve (overrides config).
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Reload pages when their files change (default: enabled).
    #[arg(long)]
    watch: Option<bool>,

    /// Disable change watching.
    #[arg(long, conflicts_with = "watch")]
    no_watch: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let watch = self.resolve_watch();
        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            directory: self.directory,
            watch,
        };

        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        tracing::debug!(?config, "Loaded configuration");
        let cache = &config.cache_resolved;

        if !cache.directory.is_dir() {
            return Err(CliError::Validation(format!(
                "Page directory does not exist: {}",
                cache.directory.display()
            )));
        }

        output.info(&format!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        ));
        output.info(&format!("Page directory: {}", cache.directory.display()));
        if let Some(path) = &config.config_path {
            output.info(&format!("Config file: {}", path.display()));
        }

        if cache.watch {
            output.info(&format!("Watching: enabled (ignore file {})", cache.ignore_file.display()));
        } else {
            output.info("Watching: disabled");
        }

        let server_config = server_config_from_config(&config);
        run_server(server_config)
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }

    /// Resolve `watch` from --watch/--no-watch flags.
    fn resolve_watch(&self) -> Option<bool> {
        self.no_watch.then_some(false).or(self.watch)
    }
}
