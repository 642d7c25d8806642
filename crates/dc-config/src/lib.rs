//! Configuration management for dom-cache.
//!
//! Parses `dcserver.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the served directory.
    pub directory: Option<PathBuf>,
    /// Override the watch flag.
    pub watch: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "dcserver.toml";

/// Ignore file looked up in the served directory when none is configured.
const DEFAULT_IGNORE_FILE: &str = ".gitignore";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Cache configuration (paths are relative strings from TOML).
    cache: CacheConfigRaw,

    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9000,
        }
    }
}

/// Raw cache configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    directory: Option<String>,
    extension: Option<String>,
    ignore_file: Option<String>,
    ignore_errors: Option<bool>,
    form_handling: Option<bool>,
    template_js_data: Option<bool>,
    query_selector: Option<bool>,
    watch: Option<bool>,
    debounce_ms: Option<u64>,
}

/// Resolved cache configuration with absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding the pages.
    pub directory: PathBuf,
    /// Page file extension, without the dot.
    pub extension: String,
    /// Ignore-pattern file.
    pub ignore_file: PathBuf,
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
    /// Change coalescing window in milliseconds.
    pub debounce_ms: u64,
}

impl CacheConfig {
    fn with_base(base: &Path) -> Self {
        Self {
            directory: base.to_path_buf(),
            extension: "html".to_owned(),
            ignore_file: base.join(DEFAULT_IGNORE_FILE),
            ignore_errors: false,
            form_handling: true,
            template_js_data: true,
            query_selector: true,
            watch: true,
            debounce_ms: 100,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::with_base(Path::new("."))
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`DC_HOST`} environment variable not found").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `dcserver.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(directory) = &settings.directory {
            self.cache_resolved.directory.clone_from(directory);
            // A configured ignore file stays put; the default follows the directory.
            if self.cache.ignore_file.is_none() {
                self.cache_resolved.ignore_file = directory.join(DEFAULT_IGNORE_FILE);
            }
        }
        if let Some(watch) = settings.watch {
            self.cache_resolved.watch = watch;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config serving the current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config serving the given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            cache: CacheConfigRaw::default(),
            cache_resolved: CacheConfig::with_base(base),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        // Validate configuration after loading and resolution
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file and after applying CLI
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_cache()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but it's
        // unlikely to be intentional in a config file
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate cache configuration.
    fn validate_cache(&self) -> Result<(), ConfigError> {
        let extension = &self.cache_resolved.extension;
        require_non_empty(extension, "cache.extension")?;
        if extension.contains(['.', '/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "cache.extension must be a bare extension like \"html\", got \"{extension}\""
            )));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let raw = &self.cache;
        let defaults = CacheConfig::with_base(config_dir);
        let directory = raw
            .directory
            .as_deref()
            .map_or(defaults.directory, |d| config_dir.join(d));
        let ignore_file = raw.ignore_file.as_deref().map_or_else(
            || directory.join(DEFAULT_IGNORE_FILE),
            |f| config_dir.join(f),
        );

        self.cache_resolved = CacheConfig {
            ignore_file,
            extension: raw.extension.clone().unwrap_or(defaults.extension),
            ignore_errors: raw.ignore_errors.unwrap_or(defaults.ignore_errors),
            form_handling: raw.form_handling.unwrap_or(defaults.form_handling),
            template_js_data: raw.template_js_data.unwrap_or(defaults.template_js_data),
            query_selector: raw.query_selector.unwrap_or(defaults.query_selector),
            watch: raw.watch.unwrap_or(defaults.watch),
            debounce_ms: raw.debounce_ms.unwrap_or(defaults.debounce_ms),
            directory,
        };
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.cache_resolved.directory, PathBuf::from("/test"));
        assert_eq!(
            config.cache_resolved.ignore_file,
            PathBuf::from("/test/.gitignore")
        );
        assert_eq!(config.cache_resolved.extension, "html");
        assert!(config.cache_resolved.watch);
        assert!(config.cache_resolved.form_handling);
        assert!(config.cache_resolved.template_js_data);
        assert!(config.cache_resolved.query_selector);
        assert_eq!(config.cache_resolved.debounce_ms, 100);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_parse_server_config() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 8080
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_resolve_paths() {
        let toml = r#"
[cache]
directory = "pages"
ignore_file = "config/ignore"
extension = "htm"
form_handling = false
watch = false
debounce_ms = 0
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(
            config.cache_resolved,
            CacheConfig {
                directory: PathBuf::from("/project/pages"),
                extension: "htm".to_owned(),
                ignore_file: PathBuf::from("/project/config/ignore"),
                ignore_errors: false,
                form_handling: false,
                template_js_data: true,
                query_selector: true,
                watch: false,
                debounce_ms: 0,
            }
        );
    }

    #[test]
    fn test_resolve_paths_default_ignore_file_follows_directory() {
        let toml = r#"
[cache]
directory = "pages"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(
            config.cache_resolved.ignore_file,
            PathBuf::from("/project/pages/.gitignore")
        );
    }

    #[test]
    fn test_unknown_cache_key_is_ignored() {
        let toml = r#"
[cache]
directory = "pages"
colour = "blue"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.directory.as_deref(), Some("pages"));
    }

    #[test]
    fn test_apply_cli_settings_host() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            host: Some("0.0.0.0".to_owned()),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000); // Unchanged
    }

    #[test]
    fn test_apply_cli_settings_port() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            port: Some(8000),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "127.0.0.1"); // Unchanged
    }

    #[test]
    fn test_apply_cli_settings_directory_moves_default_ignore_file() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            directory: Some(PathBuf::from("/srv/pages")),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.cache_resolved.directory, PathBuf::from("/srv/pages"));
        assert_eq!(
            config.cache_resolved.ignore_file,
            PathBuf::from("/srv/pages/.gitignore")
        );
    }

    #[test]
    fn test_apply_cli_settings_directory_keeps_configured_ignore_file() {
        let toml = r#"
[cache]
ignore_file = "shared.ignore"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));
        let overrides = CliSettings {
            directory: Some(PathBuf::from("/srv/pages")),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(
            config.cache_resolved.ignore_file,
            PathBuf::from("/project/shared.ignore")
        );
    }

    #[test]
    fn test_apply_cli_settings_watch() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            watch: Some(false),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert!(!config.cache_resolved.watch);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dcserver.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9100

[cache]
directory = "site"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.cache_resolved.directory, dir.path().join("site"));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/dcserver.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dcserver.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_rejects_cli_port_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dcserver.toml");
        std::fs::write(&path, "").unwrap();
        let overrides = CliSettings {
            port: Some(0),
            ..Default::default()
        };

        let err = Config::load(Some(&path), Some(&overrides)).unwrap_err();

        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn test_expand_env_vars_server_host() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("DC_TEST_HOST", "0.0.0.0");
        }

        let toml = r#"
[server]
host = "${DC_TEST_HOST}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();

        assert_eq!(config.server.host, "0.0.0.0");

        unsafe {
            std::env::remove_var("DC_TEST_HOST");
        }
    }

    #[test]
    fn test_expand_env_vars_missing_required_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("MISSING_VAR_DC_CONFIG_TEST");
        }

        let toml = r#"
[server]
host = "${MISSING_VAR_DC_CONFIG_TEST}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        let err = config.expand_env_vars().unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("MISSING_VAR_DC_CONFIG_TEST"));
        assert!(err.to_string().contains("server.host"));
    }

    // Validation tests

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_validation_error(config: &Config, expected_substrings: &[&str]) {
        let result = config.validate();
        assert!(result.is_err(), "Expected validation to fail");
        let err = result.unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected_substrings {
            assert!(
                msg.contains(s),
                "Expected error to contain '{s}', got: {msg}"
            );
        }
    }

    #[test]
    fn test_validate_default_config_passes() {
        let config = Config::default_with_base(Path::new("/test"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_server_host_empty() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.host = String::new();
        assert_validation_error(&config, &["server.host", "empty"]);
    }

    #[test]
    fn test_validate_server_port_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.port = 0;
        assert_validation_error(&config, &["server.port"]);
    }

    #[test]
    fn test_validate_extension_empty() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.cache_resolved.extension = String::new();
        assert_validation_error(&config, &["cache.extension", "empty"]);
    }

    #[test]
    fn test_validate_extension_with_dot() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.cache_resolved.extension = ".html".to_owned();
        assert_validation_error(&config, &["cache.extension", "bare"]);
    }
}
