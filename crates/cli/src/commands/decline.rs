//! `mergeflow decline`: abort the merge on the server.

use anyhow::{Context, Result};
use dialoguer::Confirm;

use mergeflow_core::config::AppConfig;

use super::style;

pub async fn run_decline(config: &AppConfig, repo: &str, path: &str, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Abort the merge in '{}' and drop its merge commit?",
                repo
            ))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !confirmed {
            println!("{}", style::warn("Decline cancelled. Nothing was changed."));
            return Ok(());
        }
    }

    let api = super::client(config)?;
    let result = api
        .decline_merge(path, repo)
        .await
        .context("failed to decline merge")?;

    println!(
        "{}",
        style::success(&format!("Merge declined in {}", result.repo_name))
    );
    println!("  Action : {}", result.action);
    if !result.stdout.trim().is_empty() {
        println!();
        println!("{}", style::dim(result.stdout.trim_end()));
    }

    Ok(())
}
