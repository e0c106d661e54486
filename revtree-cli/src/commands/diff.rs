use crate::display::print_item_diff;
use crate::workspace::Workspace;
use anyhow::Result;
use colored::Colorize;
use revtree_core::{Head, ItemDiff, ItemState, Snapshot};
use std::path::Path;

/// Shows uncommitted changes, or the records of one revision when given.
pub fn run(dir: &Path, revision: Option<String>) -> Result<()> {
    let workspace = Workspace::open(dir)?;
    let vcs = &workspace.vcs;

    let (records, state) = match revision {
        Some(prefix) => {
            let revision = vcs.resolve_revision(&prefix)?;
            println!("{}", format!("Diff for revision {}", revision.id()).bold().cyan());
            println!("{}: {}", "Message".bold(), revision.message());
            println!();

            let state = match revision.parent() {
                Some(parent) => {
                    let scratch = Head::new(&parent);
                    scratch.move_to(&parent);
                    scratch.state()
                }
                None => Snapshot::new(),
            };
            (revision.items(), state)
        }
        None => {
            let records = vcs.diff(&workspace.project).items();
            if records.is_empty() {
                println!("{}", "No uncommitted changes".green());
                return Ok(());
            }

            println!("{}", "Uncommitted changes".bold().cyan());
            println!();
            (records, vcs.head().state())
        }
    };

    if records.is_empty() {
        println!("{}", "Revision records nothing".dimmed());
    }

    for record in &records {
        let diff = ItemDiff::build(record, &state);
        if diff.deltas.is_empty() {
            println!("  {} {}", record.vcs_name(), "[no field changes]".dimmed());
            continue;
        }
        print_item_diff(&diff);
    }

    Ok(())
}
