//! TOML-based configuration system for mergeflow.
//!
//! The session token is never written into the file. It is stored as a
//! `session_env` field naming an environment variable, and resolved at
//! runtime via [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service connection settings.
    pub server: ServerConfig,

    /// Resolution stream endpoint settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Where the service lives and who we are on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the service (e.g. `http://localhost:8080`).
    pub base_url: String,

    /// Environment variable holding the session cookie value.
    #[serde(default)]
    pub session_env: Option<String>,

    /// GitHub account that owns the checked-out repositories.
    #[serde(default)]
    pub github_username: Option<String>,

    /// Default repository name used when a command omits `--repo`.
    #[serde(default)]
    pub repo: Option<String>,

    /// Resolved session token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub session: Option<String>,
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// HTTP method used to open the resolution stream.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamMethod {
    /// JSON request body.
    #[default]
    Post,
    /// `?message=` query parameter, no body.
    Get,
}

/// Resolution stream endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Endpoint path, relative to `server.base_url`, or an absolute URL.
    #[serde(default = "default_stream_endpoint")]
    pub endpoint: String,

    /// Request method.
    #[serde(default)]
    pub method: StreamMethod,

    /// Seconds to wait for the next body segment. `0` or absent waits forever.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
}

fn default_stream_endpoint() -> String {
    "/api/gemini/resolve-conflicts-file-stream".into()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_stream_endpoint(),
            method: StreamMethod::default(),
            read_timeout_secs: None,
        }
    }
}

impl StreamConfig {
    /// The per-read timeout, if one is configured.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Default config location: `~/.config/mergeflow/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mergeflow")
            .join("config.toml")
    }

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

    /// Resolve `*_env` fields from environment variables.
    ///
    /// A missing variable logs a warning but does **not** fail; requests are
    /// then sent without a session cookie.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.server.session_env {
            self.server.session = resolve_optional_env(env_name, "server.session_env");
        }
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.server.base_url.trim();
        if base.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server.base_url".into(),
                detail: "base URL must not be empty".into(),
            });
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "server.base_url".into(),
                detail: "base URL must start with http:// or https://".into(),
            });
        }
        if reqwest::Url::parse(base).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "server.base_url".into(),
                detail: format!("'{}' is not a valid URL", base),
            });
        }
        if self.stream.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "stream.endpoint".into(),
                detail: "stream endpoint must not be empty".into(),
            });
        }
        if let Some(ref repo) = self.server.repo {
            if !crate::api::is_valid_repo_name(repo) {
                return Err(ConfigError::InvalidValue {
                    field: "server.repo".into(),
                    detail: format!("'{}' is not a valid repository name", repo),
                });
            }
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

    /// Absolute URL of the stream endpoint.
    ///
    /// An endpoint that is already an absolute URL is used as-is.
    pub fn stream_url(&self) -> String {
        let endpoint = self.stream.endpoint.trim();
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            self.server.base_url.trim().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
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
