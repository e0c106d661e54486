use crate::workspace::Workspace;
use anyhow::Result;
use colored::Colorize;
use revtree_core::TrackedItemsSource;
use std::path::Path;

pub fn add(dir: &Path, type_tag: String, name: String, fields: Vec<String>) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;

    let fields = fields
        .iter()
        .map(|raw| super::parse_assignment(raw))
        .collect::<Result<Vec<_>>>()?;

    let id = workspace.project.add_document(&type_tag, &name, &fields)?;
    workspace.vcs.mark_project_changed();
    workspace.save()?;

    println!("{} {} {}", "+".green(), name.bold(), id.to_string().dimmed());
    Ok(())
}

pub fn set(dir: &Path, item: String, assignments: Vec<String>, unset: Vec<String>) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;
    let id = workspace.project.resolve(&item)?;

    for raw in &assignments {
        let (key, value) = super::parse_assignment(raw)?;
        workspace.project.set_field(id, &key, value)?;
        println!("  {} {}", "~".yellow(), raw);
    }

    for key in &unset {
        if workspace.project.remove_field(id, key)? {
            println!("  {} {}", "-".red(), key);
        } else {
            println!("  {} {} {}", "?".dimmed(), key, "(not set)".dimmed());
        }
    }

    workspace.vcs.mark_project_changed();
    workspace.save()?;
    Ok(())
}

pub fn remove(dir: &Path, item: String) -> Result<()> {
    let mut workspace = Workspace::open(dir)?;
    let id = workspace.project.resolve(&item)?;

    workspace.project.delete_tracked_item(id);
    workspace.vcs.mark_project_changed();
    workspace.save()?;

    println!("{} {} {}", "-".red(), item.bold(), id.to_string().dimmed());
    Ok(())
}
