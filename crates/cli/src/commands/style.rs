//! Shared styling for CLI output.

use console::Style;

/// Green check mark, then `msg`.
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Red cross, then `msg`.
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// A file that still has unresolved conflicts.
pub fn conflicted(msg: &str) -> String {
    let style = Style::new().red().bold();
    format!("{} {}", style.apply_to(msg), style.apply_to("(conflict)"))
}
