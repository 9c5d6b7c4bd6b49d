//! Interactive and scripted merge-conflict resolution.

use anyhow::{Context, Result};
use clap::ValueEnum;
use dialoguer::{Editor, Select};

use branchview_core::merge::{ConflictContext, Resolution};

use crate::style;

/// Non-interactive choice passed with `merge --resolve`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveChoice {
    /// Keep the source branch content.
    Source,
    /// Keep the target branch content.
    Target,
    /// Edit the result in $EDITOR.
    Manual,
}

pub fn print_conflict(conflict: &ConflictContext, source: &str, target: &str) {
    println!();
    println!("{}", style::warn(&format!("Merge conflict: {} -> {}", source, target)));
    println!();
    println!("{}", style::dim(&format!("--- {} (target)", target)));
    println!("{}", style::dim(&format!("+++ {} (source)", source)));
    for line in conflict.diff().lines().skip(2) {
        println!("{}", style::diff_line(line));
    }
    println!();
}

/// Turn a choice into a [`Resolution`]. `None` means the user backed out.
pub fn resolution(
    conflict: &ConflictContext,
    choice: Option<ResolveChoice>,
) -> Result<Option<Resolution>> {
    let choice = match choice {
        Some(choice) => choice,
        None => {
            let items = &[
                "Use source content",
                "Use target content",
                "Edit manually",
                "Cancel",
            ];
            let picked = Select::new()
                .with_prompt("How should the conflict be resolved?")
                .items(items)
                .default(0)
                .interact()
                .context("failed to read resolution choice")?;
            match picked {
                0 => ResolveChoice::Source,
                1 => ResolveChoice::Target,
                2 => ResolveChoice::Manual,
                _ => return Ok(None),
            }
        }
    };

    Ok(match choice {
        ResolveChoice::Source => Some(Resolution::UseSource),
        ResolveChoice::Target => Some(Resolution::UseTarget),
        ResolveChoice::Manual => Editor::new()
            .edit(&merge_template(conflict))
            .context("failed to run editor")?
            .map(Resolution::Manual),
    })
}

/// Starting text for a manual resolution, with both sides marked.
fn merge_template(conflict: &ConflictContext) -> String {
    format!(
        "<<<<<<< source\n{}=======\n{}>>>>>>> target\n",
        with_newline(&conflict.source),
        with_newline(&conflict.target)
    )
}

fn with_newline(text: &str) -> String {
    if text.is_empty() || text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{}\n", text)
    }
}
