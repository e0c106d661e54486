use crate::revision_item::{RevisionItem, RevisionItemKind, RevisionItemRecord};
use crate::tracked::ItemState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Full state of every tracked item as of one point in history.
///
/// Insertion order is kept so that materializing a snapshot recreates items
/// in the order they were first recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    items: Vec<Arc<RevisionItem>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RevisionItem>> {
        self.items.iter()
    }

    pub fn get(&self, id: Uuid) -> Option<&Arc<RevisionItem>> {
        self.items.iter().find(|item| item.uuid() == id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.position(id).is_some()
    }

    pub fn add_item(&mut self, item: Arc<RevisionItem>) {
        match self.position(item.uuid()) {
            Some(index) => self.items[index] = item,
            None => self.items.push(item),
        }
    }

    pub fn remove_item(&mut self, item: &RevisionItem) {
        match self.position(item.uuid()) {
            Some(index) => {
                self.items.remove(index);
            }
            None => warn!(
                "Snapshot has no item {} ({}) to remove",
                item.uuid(),
                item.vcs_name()
            ),
        }
    }

    /// Replaces the entry for the item's uuid with the entry composed with
    /// the incoming changes by the item's diff logic.
    pub fn merge_item(&mut self, item: &RevisionItem) {
        let Some(index) = self.position(item.uuid()) else {
            warn!(
                "Snapshot has no item {} ({}) to merge into",
                item.uuid(),
                item.vcs_name()
            );
            return;
        };

        let existing = Arc::clone(&self.items[index]);
        let merged = existing
            .diff_logic()
            .create_merged_item(&*existing, item);
        self.items[index] = Arc::new(RevisionItem::new(RevisionItemKind::Added, &merged));
    }

    pub fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            items: self.items.iter().map(|item| item.to_record()).collect(),
        }
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.uuid() == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default)]
    pub items: Vec<RevisionItemRecord>,
}
