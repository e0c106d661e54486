use crate::display::{revision_date, short_id, sync_tag};
use crate::workspace::Workspace;
use anyhow::Result;
use colored::Colorize;
use revtree_core::Revision;
use std::path::Path;
use std::sync::Arc;

/// Prints the revision tree, newest branch tips last, marking the head.
pub fn run(dir: &Path, limit: Option<usize>, path_only: bool) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let vcs = &workspace.vcs;
    let heading = vcs.heading_revision();

    let revisions: Vec<Arc<Revision>> = if path_only {
        heading.path_from_root()
    } else {
        vcs.revisions()
    };

    println!("{}", "Revision History".bold().cyan());
    println!();

    let to_show = limit.unwrap_or(revisions.len()).min(revisions.len());

    for revision in revisions.iter().take(to_show) {
        let depth = revision.path_from_root().len() - 1;
        let indent = "  ".repeat(depth.min(12));
        let marker = if Arc::ptr_eq(revision, &heading) {
            "*".green().bold()
        } else {
            "•".dimmed()
        };

        println!(
            "{}{} {} {} [{}]",
            indent,
            marker,
            "revision".yellow().bold(),
            short_id(revision.id()).yellow(),
            sync_tag(vcs.revision_sync_state(revision))
        );
        println!(
            "{}    {} {} · {} item(s)",
            indent,
            revision.message(),
            revision_date(revision).dimmed(),
            revision.items().len().to_string().cyan()
        );
    }

    if revisions.len() > to_show {
        println!();
        println!(
            "{}",
            format!("... and {} more revisions", revisions.len() - to_show).dimmed()
        );
        println!("Use {} to see more", "--limit N".cyan());
    }

    Ok(())
}
