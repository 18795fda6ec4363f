//! Unified diffs between a conflicted file and its proposed resolution.
//!
//! Uses the `diffy` crate, the same line-based engine the merge tooling
//! relies on, so what the user reviews is exactly what will be committed.

use diffy::{Line, PatchFormatter};
use tracing::debug;

/// Line counts of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub hunks: usize,
    pub added: usize,
    pub removed: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.hunks == 0
    }
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} hunk(s), +{} -{}",
            self.hunks, self.added, self.removed
        )
    }
}

/// Count hunks and changed lines going from `original` to `resolved`.
pub fn summarize(original: &str, resolved: &str) -> DiffSummary {
    let patch = diffy::create_patch(original, resolved);
    let mut summary = DiffSummary {
        hunks: patch.hunks().len(),
        ..DiffSummary::default()
    };
    for hunk in patch.hunks() {
        for line in hunk.lines() {
            match line {
                Line::Insert(_) => summary.added += 1,
                Line::Delete(_) => summary.removed += 1,
                Line::Context(_) => {}
            }
        }
    }
    debug!(%summary, "summarized resolution diff");
    summary
}

/// Render a unified diff, optionally with ANSI colours.
pub fn render_diff(original: &str, resolved: &str, color: bool) -> String {
    let patch = diffy::create_patch(original, resolved);
    let formatter = if color {
        PatchFormatter::new().with_color()
    } else {
        PatchFormatter::new()
    };
    let rendered = formatter.fmt_patch(&patch).to_string();
    rendered
}
