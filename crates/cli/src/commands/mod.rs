//! Subcommands that talk to the service.
//!
//! Every command except init and validate shares the config loading and
//! repository selection below.

pub mod decline;
pub mod files;
pub mod repos;
pub mod resolve;
pub mod style;
pub mod whoami;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use mergeflow_core::api::{is_valid_repo_name, ApiClient};
use mergeflow_core::config::AppConfig;

/// Load, resolve and validate the config.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path).with_context(|| {
        format!(
            "failed to load configuration from {} (run `mergeflow init` to create one)",
            path.display()
        )
    })
}

pub fn client(config: &AppConfig) -> Result<ApiClient> {
    ApiClient::from_config(config).context("failed to create API client")
}

/// `--repo`, else `server.repo`.
pub fn repo_name(config: &AppConfig, flag: Option<String>) -> Result<String> {
    let repo = flag
        .or_else(|| config.server.repo.clone())
        .context("no repository given: pass --repo or set server.repo in the config")?;
    if !is_valid_repo_name(&repo) {
        anyhow::bail!(
            "invalid repository name '{}': use letters, digits, '.', '_' or '-'",
            repo
        );
    }
    Ok(repo)
}

pub fn github_username(config: &AppConfig) -> Result<&str> {
    config
        .server
        .github_username
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .context("server.github_username is not set")
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
