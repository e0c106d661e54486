use crate::workspace::Workspace;
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

pub fn run(dir: &Path, only: Vec<usize>, yes: bool) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;

    let pending = workspace.vcs.diff(&workspace.project).items().len();
    if pending == 0 {
        println!("{}", "Nothing to reset".green());
        return Ok(());
    }

    let count = if only.is_empty() { pending } else { only.len() };
    if !super::confirm(&format!("Discard {} change(s)?", count), yes)? {
        println!("{}", "Reset aborted".dimmed());
        return Ok(());
    }

    if only.is_empty() {
        workspace.vcs.reset_all_changes(&mut workspace.project);
    } else {
        workspace.vcs.reset_changes(&mut workspace.project, &only)?;
    }
    workspace.vcs.mark_project_changed();
    workspace.save()?;

    println!(
        "{}",
        format!("✓ Discarded {} change(s)", count).green().bold()
    );
    Ok(())
}
