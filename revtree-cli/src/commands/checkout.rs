use crate::display::short_id;
use crate::workspace::Workspace;
use anyhow::{bail, Result};
use colored::Colorize;
use revtree_core::{ItemState, Revision};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub fn checkout(dir: &Path, revision: String, yes: bool) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;
    let target = workspace.vcs.resolve_revision(&revision)?;

    let pending = workspace.vcs.diff(&workspace.project).items().len();
    if pending > 0 {
        println!(
            "{} {} uncommitted change(s) will be lost",
            "⚠".yellow(),
            pending
        );
        if !super::confirm("Check out anyway?", yes)? {
            println!("{}", "Checkout aborted".dimmed());
            return Ok(());
        }
    }

    workspace.vcs.checkout(&mut workspace.project, &target)?;
    workspace.save()?;

    println!(
        "{} {} {}",
        "✓ Checked out".green().bold(),
        short_id(target.id()).yellow(),
        target.message()
    );
    println!(
        "  {}: {}",
        "Items".bold(),
        workspace.project.items().count()
    );
    Ok(())
}

pub fn cherry_pick(dir: &Path, revision: String, items: Vec<String>) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;
    let source = workspace.vcs.resolve_revision(&revision)?;

    let uuids = items
        .iter()
        .map(|key| resolve_in_history(&source, key))
        .collect::<Result<Vec<Uuid>>>()?;

    workspace
        .vcs
        .cherry_pick(&mut workspace.project, &source, &uuids)?;
    workspace.vcs.mark_project_changed();
    workspace.save()?;

    println!(
        "{} {} item(s) from {}",
        "✓ Picked".green().bold(),
        uuids.len(),
        short_id(source.id()).yellow()
    );
    Ok(())
}

/// Items may no longer exist in the live project, so names and uuid
/// prefixes are looked up in the records leading to `revision`.
fn resolve_in_history(revision: &Arc<Revision>, key: &str) -> Result<Uuid> {
    let mut matches: Vec<Uuid> = Vec::new();

    for step in revision.path_from_root() {
        for item in step.items() {
            let id = item.uuid();
            if (item.vcs_name() == key || id.to_string().starts_with(key)) && !matches.contains(&id) {
                matches.push(id);
            }
        }
    }

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("No item '{}' in the history of {}", key, short_id(revision.id())),
        _ => bail!("'{}' matches {} items, use a longer uuid prefix", key, matches.len()),
    }
}
