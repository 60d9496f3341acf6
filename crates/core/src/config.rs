//! TOML-based configuration system for Chronicle.
//!
//! Sensitive values (webhook URLs, signing secrets) are stored as `_env`
//! fields that reference environment variable names. The actual secrets are
//! resolved at runtime via [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage settings (database location, log level).
    pub storage: StorageConfig,

    /// Event delivery settings.
    #[serde(default)]
    pub events: EventConfig,

    /// Engine behaviour settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/chronicle/chronicle.db")
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Event delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Environment variable holding the webhook endpoint URL. When unset, no
    /// webhook channel is configured.
    #[serde(default)]
    pub webhook_url_env: Option<String>,

    /// Environment variable holding the webhook signing secret.
    #[serde(default)]
    pub webhook_secret_env: Option<String>,

    /// Webhook request timeout in seconds (default 10).
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,

    /// Resolved webhook URL (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub webhook_url: Option<String>,

    /// Resolved signing secret.
    #[serde(skip)]
    pub webhook_secret: Option<String>,
}

fn default_webhook_timeout() -> u64 {
    10
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            webhook_url_env: None,
            webhook_secret_env: None,
            timeout_secs: default_webhook_timeout(),
            webhook_url: None,
            webhook_secret: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine behaviour
// ---------------------------------------------------------------------------

/// Engine behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Branch used when a commit names no branch (default `main`).
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Author recorded when a command names none.
    #[serde(default)]
    pub default_author: Option<String>,

    /// Maximum versions returned by a history listing (default 50).
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

fn default_branch() -> String {
    "main".into()
}
fn default_history_limit() -> u32 {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            default_author: None,
            history_limit: default_history_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables and populate the
    /// corresponding resolved fields.
    ///
    /// Fields that reference a missing variable will log a warning but will
    /// **not** fail -- callers can check the `Option` fields and decide what
    /// is required for their execution mode.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.events.webhook_url_env {
            self.events.webhook_url = resolve_optional_env(env_name, "events.webhook_url_env");
        }
        if let Some(ref env_name) = self.events.webhook_secret_env {
            self.events.webhook_secret =
                resolve_optional_env(env_name, "events.webhook_secret_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.db_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.db_path".into(),
                detail: "database path must not be empty".into(),
            });
        }
        if self.engine.default_branch.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "engine.default_branch".into(),
                detail: "default branch name must not be empty".into(),
            });
        }
        if self.engine.history_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.history_limit".into(),
                detail: "history limit must be > 0".into(),
            });
        }
        if self.events.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "events.timeout_secs".into(),
                detail: "webhook timeout must be > 0".into(),
            });
        }
        if self.events.webhook_secret_env.is_some() && self.events.webhook_url_env.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "events.webhook_secret_env".into(),
                detail: "a webhook secret is set but no webhook URL is configured".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// The per-user config file location: `<config dir>/chronicle/config.toml`,
/// falling back to `./chronicle.toml` when no config directory exists.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("chronicle").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("chronicle.toml"))
}

/// A commented sample configuration, written by `chronicle init`.
pub fn sample_config() -> &'static str {
    r#"# Chronicle configuration.

[storage]
# Path to the SQLite database file.
db_path = "/var/lib/chronicle/chronicle.db"
# Minimum log level: trace, debug, info, warn, error.
log_level = "info"

[events]
# Environment variable holding the webhook endpoint URL. Leave unset to
# disable webhook delivery.
# webhook_url_env = "CHRONICLE_WEBHOOK_URL"
# Environment variable holding the webhook signing secret.
# webhook_secret_env = "CHRONICLE_WEBHOOK_SECRET"
# Webhook request timeout in seconds.
timeout_secs = 10

[engine]
# Branch used when a commit names no branch.
default_branch = "main"
# Author recorded when a command names none.
# default_author = "gm"
# Maximum versions returned by a history listing.
history_limit = 50
"#
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
