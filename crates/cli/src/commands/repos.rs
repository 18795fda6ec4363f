//! `repos` and `clone`: which repositories exist, and getting one onto the
//! server.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use mergeflow_core::api::is_valid_repo_name;
use mergeflow_core::config::AppConfig;

use super::style;

pub async fn run_repos(config: &AppConfig) -> Result<()> {
    let api = super::client(config)?;
    let mut repos = api
        .list_repos()
        .await
        .context("failed to list repositories")?;

    println!();
    if repos.is_empty() {
        println!("{}", style::warn("No repositories visible to the linked account"));
        println!();
        return Ok(());
    }
    repos.sort_by_key(|name| name.to_lowercase());

    println!(
        "{}",
        style::header(&format!("Repositories ({})", repos.len()))
    );
    println!();

    let default = config.server.repo.as_deref();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Repository", "Default"]);
    for name in &repos {
        let marker = if Some(name.as_str()) == default { "yes" } else { "" };
        table.add_row(vec![Cell::new(name), Cell::new(marker)]);
    }

    println!("{}", table);
    println!();
    println!(
        "{}",
        style::dim("Clone one onto the server with: mergeflow clone <repo>")
    );
    println!();

    Ok(())
}

pub async fn run_clone(
    config: &AppConfig,
    repo: &str,
    owner: Option<&str>,
    force: bool,
) -> Result<()> {
    let owner = match owner {
        Some(owner) => owner,
        None => super::github_username(config)?,
    };
    if !is_valid_repo_name(owner) || !is_valid_repo_name(repo) {
        anyhow::bail!(
            "invalid repository '{}/{}': use letters, digits, '.', '_' or '-'",
            owner,
            repo
        );
    }

    let api = super::client(config)?;
    let result = api
        .clone_repo(owner, repo, force)
        .await
        .with_context(|| format!("failed to clone {}/{}", owner, repo))?;

    println!(
        "{}",
        style::success(&format!("Cloned {}/{}", result.owner, result.repo))
    );
    let branch = if result.default_branch.is_empty() {
        style::dim("unknown")
    } else {
        result.default_branch.clone()
    };
    println!("  Branch      : {}", branch);
    println!("  Shallow     : {}", if result.shallow { "yes" } else { "no" });
    println!("  Destination : {}", result.destination);

    Ok(())
}
