use colored::{ColoredString, Colorize};
use revtree_core::{DiffLineType, ItemDiff, Revision, RevisionItemKind, SyncState};
use uuid::Uuid;

pub fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

pub fn kind_icon(kind: RevisionItemKind) -> ColoredString {
    match kind {
        RevisionItemKind::Added => "+".green(),
        RevisionItemKind::Changed => "~".yellow(),
        RevisionItemKind::Removed => "-".red(),
        RevisionItemKind::Undefined => "?".dimmed(),
    }
}

pub fn kind_label(kind: RevisionItemKind) -> ColoredString {
    match kind {
        RevisionItemKind::Added => "NEW".green(),
        RevisionItemKind::Changed => "MOD".yellow(),
        RevisionItemKind::Removed => "DEL".red(),
        RevisionItemKind::Undefined => "???".dimmed(),
    }
}

pub fn sync_tag(state: SyncState) -> ColoredString {
    match state {
        SyncState::FullSync => "synced".green(),
        SyncState::ShallowCopy => "shallow".yellow(),
        SyncState::NoSync => "local".dimmed(),
    }
}

pub fn revision_date(revision: &Revision) -> String {
    revision.datetime().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn print_item_diff(diff: &ItemDiff) {
    println!("{}", "━".repeat(80).bright_black());
    println!(
        "{} {} {}",
        kind_label(diff.kind),
        diff.name.white().bold(),
        short_id(diff.uuid).dimmed()
    );

    for delta in &diff.deltas {
        println!("{}", format!("@@ {} @@", delta.delta_type).cyan());
        for line in &delta.diff_lines {
            let (prefix, color): (&str, fn(&str) -> ColoredString) = match line.line_type {
                DiffLineType::Addition => ("+", |s| s.green()),
                DiffLineType::Deletion => ("-", |s| s.red()),
                DiffLineType::Context => (" ", |s| s.normal()),
            };
            print!("{}", color(&format!("{}{}", prefix, line.content)));
            if !line.content.ends_with('\n') {
                println!();
            }
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_is_prefix() {
        let id = Uuid::new_v4();
        assert!(id.to_string().starts_with(&short_id(id)));
        assert_eq!(short_id(id).len(), 8);
    }
}
