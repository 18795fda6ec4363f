//! `mergeflow resolve`: stream an AI resolution for one conflicted file.
//!
//! The proposal is echoed as it arrives, then shown as a diff against the
//! conflicted original. Nothing is committed until the user agrees. With
//! `--stage-only` the file is written and staged but not committed.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use mergeflow_core::config::AppConfig;
use mergeflow_core::conflict::{has_conflict_markers, parse_hunks};
use mergeflow_core::tree;
use mergeflow_core::ResolutionSession;

use super::style;

pub struct ResolveOptions<'a> {
    pub query: &'a str,
    pub repo_hash: Option<&'a str>,
    pub yes: bool,
    pub stage_only: bool,
}

pub async fn run_resolve(
    config: &AppConfig,
    repo: &str,
    path: &str,
    opts: ResolveOptions<'_>,
) -> Result<()> {
    let api = super::client(config)?;
    let user = super::github_username(config)?;

    let nodes = api
        .file_tree(repo)
        .await
        .with_context(|| format!("failed to load file tree for '{}'", repo))?;
    match tree::find_file(&nodes, path) {
        Some(file) if !file.is_conflicted => println!(
            "{}",
            style::warn(&format!("{} is not marked as conflicted", file.full_path))
        ),
        Some(_) => {}
        None => anyhow::bail!("'{}' is not in repository '{}'", path, repo),
    }

    let original = api
        .file_content(user, repo, path)
        .await
        .with_context(|| format!("failed to load '{}'", path))?;
    let hunks = parse_hunks(&original).context("conflict markers are malformed")?;
    if hunks.is_empty() {
        println!(
            "{}",
            style::success(&format!("{} has no conflict markers", path))
        );
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!(
            "Resolving {} ({} conflict hunk(s))",
            path,
            hunks.len()
        ))
    );
    println!();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .context("invalid spinner template")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message("Waiting for the model...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let live = spinner.clone();
    let mut session = ResolutionSession::new(path, original).with_preview(move |chunk| {
        if !live.is_finished() {
            live.finish_and_clear();
        }
        print!("{}", style::dim(chunk));
        let _ = std::io::stdout().flush();
    });

    let consumer = api.stream_consumer();
    let outcome = session
        .resolve(&consumer, opts.query, opts.repo_hash)
        .await;
    spinner.finish_and_clear();
    println!();
    let resolved = outcome.context("resolution stream failed")?;
    debug!(len = resolved.len(), "resolution received");

    println!();
    if let Some(summary) = session.summary() {
        println!("{}", style::header(&format!("Proposed changes: {}", summary)));
    }
    if let Some(diff) = session.diff(console::colors_enabled()) {
        println!("{}", diff);
    }
    if has_conflict_markers(&resolved) {
        println!(
            "{}",
            style::warn("The proposal still contains conflict markers")
        );
    }

    let prompt = if opts.stage_only {
        "Stage this resolution?"
    } else {
        "Commit this resolution?"
    };
    let accept = opts.yes
        || Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("failed to read confirmation")?;

    if !accept {
        session.reject()?;
        println!(
            "{}",
            style::warn("Resolution discarded. Nothing was committed.")
        );
        return Ok(());
    }

    if opts.stage_only {
        let staged = session
            .stage(&api, repo)
            .await
            .context("failed to stage resolution")?;
        println!(
            "{}",
            style::success(&format!("Staged {} in {}", staged.full_path, staged.repo_name))
        );
        println!("  Message : {}", staged.message);
        println!("  Staged  : {}", if staged.staged { "yes" } else { "no" });
        println!();
        println!(
            "{}",
            style::dim("Not committed. Commit it on the server when the merge is done.")
        );
    } else {
        let message = session
            .accept(&api, repo)
            .await
            .context("failed to commit resolution")?;
        println!(
            "{}",
            style::success(&format!("Committed and pushed {} in {}", path, repo))
        );
        println!("  Server : {}", message);
    }

    Ok(())
}
