use crate::display::{kind_icon, short_id, sync_tag};
use crate::workspace::Workspace;
use anyhow::Result;
use colored::Colorize;
use revtree_core::ItemState;
use std::path::Path;

pub fn run(dir: &Path) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    print_status(&workspace);
    Ok(())
}

pub fn print_status(workspace: &Workspace) {
    let vcs = &workspace.vcs;
    let heading = vcs.heading_revision();

    println!("{}", "Project Status".bold().cyan());
    println!("  {}: {}", "Project".bold(), workspace.config.title);
    println!("  {}: {}", "Items".bold(), workspace.project.items().count());
    println!(
        "  {}: {} {} [{}]",
        "Head".bold(),
        short_id(heading.id()).yellow(),
        heading.message(),
        sync_tag(vcs.revision_sync_state(&heading))
    );

    let stashes = vcs.stashes().num_user_stashes();
    if stashes > 0 || vcs.has_quick_stash() {
        println!(
            "  {}: {}{}",
            "Stashes".bold(),
            stashes,
            if vcs.has_quick_stash() { " (+ quick stash)" } else { "" }
        );
    }
    println!();

    let diff = vcs.diff(&workspace.project);
    let records = diff.items();

    if records.is_empty() {
        println!("{}", "No uncommitted changes".green());
        return;
    }

    println!(
        "{} {}",
        "Uncommitted changes:".bold(),
        format!("({})", records.len()).yellow()
    );
    println!();

    for (index, record) in records.iter().enumerate() {
        println!(
            "  {} {} {} {}",
            format!("[{}]", index).dimmed(),
            kind_icon(record.kind()),
            record.vcs_name(),
            short_id(record.uuid()).dimmed()
        );
    }

    println!();
    println!(
        "Run {} to commit these changes",
        "revtree commit \"message\"".cyan()
    );
}
