//! Read-only views of a repository: `tree`, `conflicts` and `show`.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::debug;

use mergeflow_core::config::AppConfig;
use mergeflow_core::conflict::parse_hunks;
use mergeflow_core::tree::{self, TreeNode};

use super::style;

/// Print the tree indented by depth, with conflicted files highlighted.
pub async fn run_tree(config: &AppConfig, repo: &str) -> Result<()> {
    let api = super::client(config)?;
    let nodes = api
        .file_tree(repo)
        .await
        .with_context(|| format!("failed to load file tree for '{}'", repo))?;

    println!();
    println!("{}", style::header(repo));
    for (depth, node) in tree::walk(&nodes) {
        let indent = "  ".repeat(depth + 1);
        match node {
            TreeNode::Directory(dir) => println!("{}{}/", indent, dir.name),
            TreeNode::File(file) if file.is_conflicted => {
                println!("{}{}", indent, style::conflicted(&file.name))
            }
            TreeNode::File(file) => println!("{}{}", indent, file.name),
        }
    }
    println!();

    let conflicts = tree::conflict_count(&nodes);
    let files = tree::file_count(&nodes);
    if conflicts == 0 {
        println!("{}", style::success(&format!("{} file(s), no conflicts", files)));
    } else {
        println!(
            "{}",
            style::warn(&format!("{} of {} file(s) in conflict", conflicts, files))
        );
    }
    println!();

    Ok(())
}

/// Table of conflicted files with the number of marker blocks in each.
pub async fn run_conflicts(config: &AppConfig, repo: &str) -> Result<()> {
    let api = super::client(config)?;
    let user = super::github_username(config)?;
    let nodes = api
        .file_tree(repo)
        .await
        .with_context(|| format!("failed to load file tree for '{}'", repo))?;

    let conflicted = tree::conflicted_files(&nodes);
    if conflicted.is_empty() {
        println!();
        println!("{}", style::success("No conflicted files"));
        println!();
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!("Conflicted Files ({})", conflicted.len()))
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["File", "Type", "Hunks"]);

    for file in &conflicted {
        let hunks = match api.file_content(user, repo, &file.full_path).await {
            Ok(content) => match parse_hunks(&content) {
                Ok(hunks) => hunks.len().to_string(),
                Err(e) => {
                    debug!(path = %file.full_path, error = %e, "unparseable markers");
                    "malformed".to_string()
                }
            },
            Err(e) => {
                debug!(path = %file.full_path, error = %e, "could not fetch content");
                "?".to_string()
            }
        };
        table.add_row(vec![
            Cell::new(&file.full_path),
            Cell::new(file.extension.as_str()),
            Cell::new(hunks),
        ]);
    }

    println!("{}", table);
    println!();
    println!(
        "{}",
        style::dim("Resolve one with: mergeflow resolve <file>")
    );
    println!();

    Ok(())
}

pub async fn run_show(config: &AppConfig, repo: &str, path: &str) -> Result<()> {
    let api = super::client(config)?;
    let user = super::github_username(config)?;
    let content = api
        .file_content(user, repo, path)
        .await
        .with_context(|| format!("failed to load '{}'", path))?;

    print!("{}", content);
    if !content.is_empty() && !content.ends_with('\n') {
        println!();
    }
    Ok(())
}
