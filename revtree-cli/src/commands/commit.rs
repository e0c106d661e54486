use crate::display::short_id;
use crate::workspace::Workspace;
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

pub fn run(dir: &Path, message: String, only: Vec<usize>) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let vcs = &workspace.vcs;

    let pending = vcs.diff(&workspace.project).items().len();
    if pending == 0 {
        println!("{}", "No changes to commit".yellow());
        return Ok(());
    }

    println!("{}", "Creating revision...".bold());

    let revision = if only.is_empty() {
        vcs.commit_all(&workspace.project, &message)?
    } else {
        vcs.commit(&workspace.project, &only, &message)?
    };
    workspace.save()?;

    println!("{}", "✓ Revision created successfully!".green().bold());
    println!("  {}: {}", "Revision".bold(), revision.id());
    println!("  {}: {}", "Message".bold(), message);
    println!(
        "  {}: {}/{}",
        "Items recorded".bold(),
        revision.items().len(),
        pending
    );
    if let Some(parent) = revision.parent() {
        println!("  {}: {}", "Parent".bold(), short_id(parent.id()));
    }

    Ok(())
}
