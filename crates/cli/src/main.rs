//! mergeflow command-line tool.
//!
//! Lists and clones repositories on the service, browses their conflicted
//! files, streams an AI resolution for one of them, and commits, stages or
//! discards the proposal.

mod commands;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mergeflow_core::config::AppConfig;

use commands::style;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// mergeflow command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "mergeflow",
    version,
    about = "Resolve merge conflicts with AI assistance from the terminal"
)]
struct Cli {
    /// Path to the TOML configuration file [default: ~/.config/mergeflow/config.toml].
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level override: trace, debug, info, warn, error.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Validate a configuration file.
    Validate,

    /// Show who the configured session belongs to.
    Whoami,

    /// List the repositories the linked GitHub account can see.
    Repos,

    /// Clone a repository onto the server.
    #[command(name = "clone")]
    CloneRepo {
        /// Repository name.
        repo: String,

        /// Owner of the repository (defaults to `server.github_username`).
        #[arg(short, long)]
        owner: Option<String>,

        /// Replace an existing checkout on the server.
        #[arg(short, long)]
        force: bool,
    },

    /// Print the repository file tree.
    Tree {
        /// Repository name (defaults to `server.repo`).
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// List conflicted files and their hunk counts.
    Conflicts {
        /// Repository name (defaults to `server.repo`).
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// Print the content of one file.
    Show {
        /// File path inside the repository.
        path: String,

        /// Repository name (defaults to `server.repo`).
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// Stream an AI resolution for a conflicted file, then commit or discard it.
    Resolve {
        /// File path inside the repository.
        path: String,

        /// Repository name (defaults to `server.repo`).
        #[arg(short, long)]
        repo: Option<String>,

        /// Extra instructions for the model.
        #[arg(short, long, default_value = "")]
        query: String,

        /// Commit hash the conflict was produced at.
        #[arg(long)]
        repo_hash: Option<String>,

        /// Commit without asking.
        #[arg(short, long)]
        yes: bool,

        /// Write and stage the file on the server without committing.
        #[arg(long)]
        stage_only: bool,
    },

    /// Abort the in-progress merge on the server.
    Decline {
        /// Repository name (defaults to `server.repo`).
        #[arg(short, long)]
        repo: Option<String>,

        /// File the merge was being resolved for.
        #[arg(long, default_value = "")]
        path: String,

        /// Decline without asking.
        #[arg(short, long)]
        yes: bool,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = config_path(cli.config.as_deref());

    let level = cli
        .log_level
        .clone()
        .or_else(|| {
            AppConfig::load_from_file(&config_path)
                .ok()
                .map(|c| c.logging.level)
        })
        .unwrap_or_else(|| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .without_time()
        .init();

    match run(cli, &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config_path: &Path) -> Result<()> {
    match cli.command {
        Commands::Init { output } => {
            let output = output
                .as_deref()
                .map(commands::expand_tilde)
                .unwrap_or_else(|| config_path.to_path_buf());
            cmd_init(&output)
        }
        Commands::Validate => cmd_validate(config_path),
        command => {
            let config = commands::load_config(config_path)?;
            match command {
                Commands::Whoami => commands::whoami::run_whoami(&config).await,
                Commands::Repos => commands::repos::run_repos(&config).await,
                Commands::CloneRepo { repo, owner, force } => {
                    commands::repos::run_clone(&config, &repo, owner.as_deref(), force).await
                }
                Commands::Tree { repo } => {
                    let repo = commands::repo_name(&config, repo)?;
                    commands::files::run_tree(&config, &repo).await
                }
                Commands::Conflicts { repo } => {
                    let repo = commands::repo_name(&config, repo)?;
                    commands::files::run_conflicts(&config, &repo).await
                }
                Commands::Show { path, repo } => {
                    let repo = commands::repo_name(&config, repo)?;
                    commands::files::run_show(&config, &repo, &path).await
                }
                Commands::Resolve {
                    path,
                    repo,
                    query,
                    repo_hash,
                    yes,
                    stage_only,
                } => {
                    let repo = commands::repo_name(&config, repo)?;
                    let opts = commands::resolve::ResolveOptions {
                        query: &query,
                        repo_hash: repo_hash.as_deref(),
                        yes,
                        stage_only,
                    };
                    commands::resolve::run_resolve(&config, &repo, &path, opts).await
                }
                Commands::Decline { repo, path, yes } => {
                    let repo = commands::repo_name(&config, repo)?;
                    commands::decline::run_decline(&config, &repo, &path, yes).await
                }
                Commands::Init { .. } | Commands::Validate => unreachable!(),
            }
        }
    }
}

fn config_path(flag: Option<&str>) -> PathBuf {
    flag.map(commands::expand_tilde)
        .unwrap_or_else(AppConfig::default_path)
}

// ---------------------------------------------------------------------------
// Config subcommands
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# mergeflow configuration

[server]
# Base URL of the conflict-resolution service.
base_url = "http://localhost:8080"

# Environment variable holding the value of the `session` cookie.
session_env = "MERGEFLOW_SESSION"

# GitHub account that owns the repositories checked out on the server.
github_username = "octocat"

# Repository used when a command omits --repo.
# repo = "my-repo"

[stream]
# Resolution endpoint, relative to base_url or absolute.
endpoint = "/api/gemini/resolve-conflicts-file-stream"

# "post" sends a JSON body; "get" sends only ?message=.
method = "post"

# Seconds to wait for the next piece of the response. 0 waits forever.
read_timeout_secs = 120

[logging]
level = "warn"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Set base_url and github_username");
    println!("  2. Export the session cookie: export MERGEFLOW_SESSION=<value>");
    println!(
        "  3. Validate with: mergeflow validate --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    let _ = config.resolve_env_vars();
    println!("  {}", style::success("Environment variable references processed"));

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All required fields are valid"));

    let not_set = || style::dim("not set");
    println!();
    println!("{}", style::header("Configuration summary:"));
    println!("  Base URL       : {}", config.server.base_url);
    println!(
        "  Session        : {}",
        if config.server.session.is_some() {
            "set".to_string()
        } else {
            not_set()
        }
    );
    println!(
        "  GitHub user    : {}",
        config
            .server
            .github_username
            .clone()
            .unwrap_or_else(not_set)
    );
    println!(
        "  Default repo   : {}",
        config.server.repo.clone().unwrap_or_else(not_set)
    );
    println!(
        "  Stream         : {} {}",
        format!("{:?}", config.stream.method).to_uppercase(),
        config.stream_url()
    );
    println!(
        "  Read timeout   : {}",
        config
            .stream
            .read_timeout()
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "none".to_string())
    );
    println!("  Log level      : {}", config.logging.level);
    println!();
    println!("Configuration is valid.");

    Ok(())
}
