//! Conflict inspection and resolution previews.
//!
//! The conflict subsystem is responsible for:
//! 1. **Markers** -- finding `<<<<<<<` / `=======` / `>>>>>>>` hunks in file content.
//! 2. **Diffs** -- rendering the change a proposed resolution makes to a file.

pub mod diff;
pub mod markers;

pub use diff::{render_diff, summarize, DiffSummary};
pub use markers::{has_conflict_markers, parse_hunks, ConflictDocument, ConflictHunk, Side};
