//! A generic field-based tracked item.
//!
//! Every field of a [`Document`] is one delta keyed by the field name, so a
//! track, a pattern or the project info block are all documents with a
//! different type tag.

use crate::delta::Delta;
use crate::tracked::{Diff, DiffLogic, ItemFactory, ItemRegistry, ItemState, TrackedItem};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub const NAME_FIELD: &str = "name";

pub const PROJECT_INFO: &str = "project_info";
pub const TRACK: &str = "track";
pub const PATTERN: &str = "pattern";

/// Type tags known to a default workspace.
pub const DEFAULT_TYPES: &[&str] = &[PROJECT_INFO, TRACK, PATTERN];

/// Compares documents field by field.
#[derive(Debug, Clone)]
pub struct FieldsDiffLogic {
    type_tag: String,
}

impl FieldsDiffLogic {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
        }
    }
}

impl DiffLogic for FieldsDiffLogic {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn create_diff(&self, target: &dyn ItemState, initial: &dyn ItemState) -> Diff {
        let mut deltas = Vec::new();

        for delta in target.deltas() {
            let unchanged = initial
                .find_delta(&delta.delta_type)
                .map(|old| old.data == delta.data)
                .unwrap_or(false);

            if !unchanged {
                deltas.push(delta.clone());
            }
        }

        for old in initial.deltas() {
            if target.find_delta(&old.delta_type).is_none() {
                deltas.push(Delta::removal(old.delta_type.clone()).with_description(&old.description));
            }
        }

        Diff::new(target.uuid(), target.vcs_name(), target.diff_logic(), deltas)
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    id: Uuid,
    logic: Arc<dyn DiffLogic>,
    deltas: Vec<Delta>,
}

impl Document {
    pub fn new(logic: Arc<dyn DiffLogic>, name: &str) -> Self {
        let mut document = Self {
            id: Uuid::new_v4(),
            logic,
            deltas: Vec::new(),
        };
        document.set_field(NAME_FIELD, Value::String(name.to_string()));
        document
    }

    pub fn from_state(id: Uuid, logic: Arc<dyn DiffLogic>, seed: &dyn ItemState) -> Self {
        let mut document = Self {
            id,
            logic,
            deltas: Vec::new(),
        };
        document.reset_state_to(seed);
        document
    }

    pub fn type_tag(&self) -> &str {
        self.logic.type_tag()
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.find_delta(key).map(|delta| &delta.data)
    }

    pub fn set_field(&mut self, key: &str, value: Value) {
        match self.deltas.iter_mut().find(|d| d.delta_type == key) {
            Some(delta) => delta.data = value,
            None => self.deltas.push(Delta::new(key, value)),
        }
    }

    pub fn remove_field(&mut self, key: &str) -> bool {
        let before = self.deltas.len();
        self.deltas.retain(|d| d.delta_type != key);
        self.deltas.len() != before
    }
}

impl ItemState for Document {
    fn uuid(&self) -> Uuid {
        self.id
    }

    fn vcs_name(&self) -> &str {
        self.field(NAME_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.logic.type_tag())
    }

    fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    fn diff_logic(&self) -> Arc<dyn DiffLogic> {
        Arc::clone(&self.logic)
    }
}

impl TrackedItem for Document {
    fn reset_state_to(&mut self, other: &dyn ItemState) {
        self.deltas = other
            .deltas()
            .iter()
            .filter(|d| !d.is_removal())
            .cloned()
            .collect();
    }
}

/// Registry where every listed type tag maps to a [`Document`].
pub fn document_registry(type_tags: &[&str]) -> ItemRegistry {
    let mut registry = ItemRegistry::new();

    for tag in type_tags {
        let logic: Arc<dyn DiffLogic> = Arc::new(FieldsDiffLogic::new(*tag));
        let factory_logic = Arc::clone(&logic);
        let factory: ItemFactory = Arc::new(move |id: Uuid, seed: &dyn ItemState| {
            Box::new(Document::from_state(id, Arc::clone(&factory_logic), seed))
                as Box<dyn TrackedItem>
        });
        registry.register(logic, factory);
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track(name: &str) -> Document {
        Document::new(Arc::new(FieldsDiffLogic::new(TRACK)), name)
    }

    #[test]
    fn test_document_fields() {
        let mut doc = track("Keys");
        doc.set_field("volume", json!(0.7));
        doc.set_field("volume", json!(0.9));

        assert_eq!(doc.vcs_name(), "Keys");
        assert_eq!(doc.type_tag(), TRACK);
        assert_eq!(doc.field("volume"), Some(&json!(0.9)));
        assert_eq!(doc.num_deltas(), 2);

        assert!(doc.remove_field("volume"));
        assert!(!doc.remove_field("volume"));
    }

    #[test]
    fn test_diff_reports_changed_added_and_removed_fields() {
        let mut initial = track("Keys");
        initial.set_field("volume", json!(0.7));
        initial.set_field("pan", json!(0));

        let mut target = initial.clone();
        target.set_field("volume", json!(0.2));
        target.remove_field("pan");
        target.set_field("color", json!("blue"));

        let diff = initial.diff_logic().create_diff(&target, &initial);

        assert!(diff.has_any_changes());
        assert_eq!(diff.find_delta("volume").unwrap().data, json!(0.2));
        assert!(diff.find_delta("pan").unwrap().is_removal());
        assert_eq!(diff.find_delta("color").unwrap().data, json!("blue"));
        assert!(diff.find_delta(NAME_FIELD).is_none());
    }

    #[test]
    fn test_identical_documents_have_no_changes() {
        let doc = track("Keys");
        let diff = doc.diff_logic().create_diff(&doc, &doc.clone());
        assert!(!diff.has_any_changes());
    }

    #[test]
    fn test_reset_state_drops_removals() {
        let mut doc = track("Keys");
        let seed = Diff::new(
            doc.uuid(),
            "Piano",
            doc.diff_logic(),
            vec![Delta::new(NAME_FIELD, json!("Piano")), Delta::removal("volume")],
        );

        doc.reset_state_to(&seed);

        assert_eq!(doc.vcs_name(), "Piano");
        assert_eq!(doc.num_deltas(), 1);
    }
}
