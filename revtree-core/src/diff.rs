//! Human-readable rendering of diff records.

use crate::revision_item::{RevisionItem, RevisionItemKind};
use crate::snapshot::Snapshot;
use crate::tracked::ItemState;
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use uuid::Uuid;

/// Line-level diff of one tracked item against its historical state.
#[derive(Debug, Clone)]
pub struct ItemDiff {
    pub uuid: Uuid,
    pub name: String,
    pub kind: RevisionItemKind,
    pub deltas: Vec<DeltaDiff>,
}

#[derive(Debug, Clone)]
pub struct DeltaDiff {
    pub delta_type: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub diff_lines: Vec<DiffLine>,
}

#[derive(Debug, Clone)]
pub struct DiffLine {
    pub line_type: DiffLineType,
    pub content: String,
    pub old_line_number: Option<usize>,
    pub new_line_number: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineType {
    Context,
    Addition,
    Deletion,
}

impl ItemDiff {
    /// Renders a diff record against the head snapshot it was computed from.
    pub fn build(record: &RevisionItem, state: &Snapshot) -> Self {
        let previous = state.get(record.uuid());

        let deltas = match record.kind() {
            RevisionItemKind::Removed => record
                .deltas()
                .iter()
                .map(|delta| DeltaDiff::new(&delta.delta_type, Some(&delta.data), None))
                .collect(),
            _ => record
                .deltas()
                .iter()
                .map(|delta| {
                    let old = previous
                        .and_then(|item| item.find_delta(&delta.delta_type))
                        .map(|old| &old.data);
                    let new = if delta.is_removal() {
                        None
                    } else {
                        Some(&delta.data)
                    };
                    DeltaDiff::new(&delta.delta_type, old, new)
                })
                .collect(),
        };

        Self {
            uuid: record.uuid(),
            name: record.vcs_name().to_string(),
            kind: record.kind(),
            deltas,
        }
    }

    pub fn format_lines(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("--- {} ({})\n", self.name, self.uuid));
        output.push_str(&format!("+++ {} [{}]\n", self.name, self.kind));

        for delta in &self.deltas {
            output.push_str(&format!("@@ {} @@\n", delta.delta_type));
            for line in &delta.diff_lines {
                let prefix = match line.line_type {
                    DiffLineType::Addition => "+",
                    DiffLineType::Deletion => "-",
                    DiffLineType::Context => " ",
                };
                output.push_str(prefix);
                output.push_str(&line.content);
                if !line.content.ends_with('\n') {
                    output.push('\n');
                }
            }
        }

        output
    }
}

impl DeltaDiff {
    fn new(delta_type: &str, old: Option<&Value>, new: Option<&Value>) -> Self {
        let old_value = old.map(render_value);
        let new_value = new.map(render_value);
        let diff_lines = compute_diff(
            old_value.as_deref().unwrap_or(""),
            new_value.as_deref().unwrap_or(""),
        );

        Self {
            delta_type: delta_type.to_string(),
            old_value,
            new_value,
            diff_lines,
        }
    }
}

fn render_value(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}

fn compute_diff(old_text: &str, new_text: &str) -> Vec<DiffLine> {
    let diff = TextDiff::from_lines(old_text, new_text);
    let mut lines = Vec::new();
    let mut old_line_num = 1;
    let mut new_line_num = 1;

    for change in diff.iter_all_changes() {
        let (line_type, old_num, new_num) = match change.tag() {
            ChangeTag::Delete => {
                let num = old_line_num;
                old_line_num += 1;
                (DiffLineType::Deletion, Some(num), None)
            }
            ChangeTag::Insert => {
                let num = new_line_num;
                new_line_num += 1;
                (DiffLineType::Addition, None, Some(num))
            }
            ChangeTag::Equal => {
                let old_num = old_line_num;
                let new_num = new_line_num;
                old_line_num += 1;
                new_line_num += 1;
                (DiffLineType::Context, Some(old_num), Some(new_num))
            }
        };

        lines.push(DiffLine {
            line_type,
            content: change.to_string(),
            old_line_number: old_num,
            new_line_number: new_num,
        });
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{document_registry, Document, TRACK};
    use serde_json::json;
    use similar_asserts::assert_eq;
    use std::sync::Arc;

    fn bass() -> Document {
        let registry = document_registry(&[TRACK]);
        let mut doc = Document::new(registry.logic_for(TRACK).unwrap(), "Bass");
        doc.set_field("volume", json!(0.5));
        doc
    }

    #[test]
    fn test_diff_computation() {
        let diff_lines = compute_diff("line 1\nline 2\n", "line 1\nline 2 modified\nline 3\n");

        assert!(diff_lines
            .iter()
            .any(|l| l.line_type == DiffLineType::Addition));
        assert!(diff_lines
            .iter()
            .any(|l| l.line_type == DiffLineType::Deletion));
        assert_eq!(diff_lines[0].line_type, DiffLineType::Context);
    }

    #[test]
    fn test_changed_record_shows_old_and_new_values() {
        let doc = bass();
        let mut state = Snapshot::new();
        state.add_item(Arc::new(RevisionItem::new(RevisionItemKind::Added, &doc)));

        let mut edited = doc.clone();
        edited.set_field("volume", json!(0.75));
        let change = doc.diff_logic().create_diff(&edited, &doc);
        let record = RevisionItem::new(RevisionItemKind::Changed, &change);

        let diff = ItemDiff::build(&record, &state);

        assert_eq!(diff.deltas.len(), 1);
        assert_eq!(diff.deltas[0].old_value.as_deref(), Some("0.5\n"));
        assert_eq!(diff.deltas[0].new_value.as_deref(), Some("0.75\n"));
        assert_eq!(
            diff.format_lines(),
            format!(
                "--- Bass ({})\n+++ Bass [changed]\n@@ volume @@\n-0.5\n+0.75\n",
                doc.uuid()
            )
        );
    }

    #[test]
    fn test_added_and_removed_records() {
        let doc = bass();
        let added = ItemDiff::build(
            &RevisionItem::new(RevisionItemKind::Added, &doc),
            &Snapshot::new(),
        );
        assert!(added.deltas.iter().all(|d| d.old_value.is_none()));
        assert!(added
            .deltas
            .iter()
            .flat_map(|d| &d.diff_lines)
            .all(|l| l.line_type == DiffLineType::Addition));

        let removed = ItemDiff::build(
            &RevisionItem::new(RevisionItemKind::Removed, &doc),
            &Snapshot::new(),
        );
        assert!(removed.deltas.iter().all(|d| d.new_value.is_none()));
        assert_eq!(removed.kind, RevisionItemKind::Removed);
    }
}
