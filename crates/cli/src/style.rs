//! Shared styling utilities for the CLI.

use console::Style;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create a warning-styled string (yellow).
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

/// Marker for the selected row of a list.
pub fn selected_marker(selected: bool) -> String {
    if selected {
        Style::new().green().bold().apply_to("●").to_string()
    } else {
        " ".to_string()
    }
}

/// A branch name, coloured like branch pointers in the graph.
pub fn branch(name: &str) -> String {
    Style::new().red().bold().apply_to(name).to_string()
}

pub fn commit_id(id: i64) -> String {
    Style::new().blue().apply_to(format!("#{}", id)).to_string()
}

/// Colour one line of a unified diff.
pub fn diff_line(line: &str) -> String {
    let style = if line.starts_with("+++") || line.starts_with("---") {
        Style::new().bold()
    } else if line.starts_with('+') {
        Style::new().green()
    } else if line.starts_with('-') {
        Style::new().red()
    } else if line.starts_with("@@") {
        Style::new().cyan()
    } else {
        Style::new()
    };
    style.apply_to(line).to_string()
}
