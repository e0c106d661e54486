use crate::display::{revision_date, short_id};
use crate::workspace::Workspace;
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

pub fn save(dir: &Path, message: String, only: Vec<usize>, keep: bool) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;

    let selected: Vec<usize> = if only.is_empty() {
        let pending = workspace.vcs.diff(&workspace.project).items().len();
        (0..pending).collect()
    } else {
        only
    };

    let stash = workspace
        .vcs
        .stash(&mut workspace.project, &selected, &message, keep)?;
    workspace.vcs.mark_project_changed();
    workspace.save()?;

    println!(
        "{} {} {} ({} item(s))",
        "✓ Stashed as".green().bold(),
        short_id(stash.id()).yellow(),
        message,
        stash.items().len()
    );
    Ok(())
}

pub fn apply(dir: &Path, key: String, keep: bool) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;

    workspace
        .vcs
        .apply_stash(&mut workspace.project, &key, keep)?;
    workspace.vcs.mark_project_changed();
    workspace.save()?;

    println!("{} {}", "✓ Applied stash".green().bold(), key);
    Ok(())
}

pub fn list(dir: &Path) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let stashes = workspace.vcs.stashes().user_stashes();

    if stashes.is_empty() && !workspace.vcs.has_quick_stash() {
        println!("{}", "No stashes".yellow());
        return Ok(());
    }

    for stash in &stashes {
        println!(
            "  {} {} {} {}",
            short_id(stash.id()).yellow(),
            stash.message(),
            format!("({} item(s))", stash.items().len()).dimmed(),
            revision_date(stash).dimmed()
        );
    }

    if let Some(quick) = workspace.vcs.stashes().quick_stash() {
        if !quick.items().is_empty() {
            println!(
                "  {} {}",
                "quick".cyan(),
                format!("({} item(s))", quick.items().len()).dimmed()
            );
        }
    }

    Ok(())
}

pub fn quick(dir: &Path) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;

    workspace.vcs.quick_stash_all(&mut workspace.project)?;
    workspace.vcs.mark_project_changed();
    workspace.save()?;

    println!("{}", "✓ All changes moved to the quick stash".green().bold());
    Ok(())
}

pub fn pop(dir: &Path) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;

    workspace.vcs.apply_quick_stash(&mut workspace.project)?;
    workspace.vcs.mark_project_changed();
    workspace.save()?;

    println!("{}", "✓ Quick stash applied".green().bold());
    Ok(())
}
