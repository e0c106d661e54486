use crate::revision::{Revision, RevisionRecord};
use crate::tracked::ItemRegistry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Detached revisions holding uncommitted changes.
///
/// User stashes are listed and applied by id or message; the quick stash is a
/// single unnamed slot used by "stash everything" and its counterpart.
#[derive(Debug, Default)]
pub struct StashesRepository {
    user_stashes: RwLock<Vec<Arc<Revision>>>,
    quick_stash: RwLock<Option<Arc<Revision>>>,
}

impl StashesRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stash(&self, stash: Arc<Revision>) {
        self.user_stashes.write().push(stash);
    }

    pub fn remove_stash(&self, id: Uuid) -> bool {
        let mut stashes = self.user_stashes.write();
        let before = stashes.len();
        stashes.retain(|s| s.id() != id);
        stashes.len() != before
    }

    pub fn user_stashes(&self) -> Vec<Arc<Revision>> {
        self.user_stashes.read().clone()
    }

    pub fn num_user_stashes(&self) -> usize {
        self.user_stashes.read().len()
    }

    /// Looks a stash up by id prefix or exact message.
    pub fn find_user_stash(&self, key: &str) -> Option<Arc<Revision>> {
        self.user_stashes
            .read()
            .iter()
            .find(|s| s.id().to_string().starts_with(key) || s.message() == key)
            .cloned()
    }

    pub fn has_quick_stash(&self) -> bool {
        self.quick_stash
            .read()
            .as_ref()
            .map(|stash| !stash.items().is_empty())
            .unwrap_or(false)
    }

    pub fn quick_stash(&self) -> Option<Arc<Revision>> {
        self.quick_stash.read().clone()
    }

    pub fn store_quick_stash(&self, stash: Arc<Revision>) {
        *self.quick_stash.write() = Some(stash);
    }

    pub fn reset_quick_stash(&self) {
        *self.quick_stash.write() = None;
    }

    pub fn reset(&self) {
        self.user_stashes.write().clear();
        self.reset_quick_stash();
    }

    pub fn to_record(&self) -> StashesRecord {
        StashesRecord {
            user_stashes: self
                .user_stashes
                .read()
                .iter()
                .map(|s| s.to_record())
                .collect(),
            quick_stash: self.quick_stash.read().as_ref().map(|s| s.to_record()),
        }
    }

    pub fn load_record(&self, record: &StashesRecord, registry: &ItemRegistry) {
        *self.user_stashes.write() = record
            .user_stashes
            .iter()
            .map(|r| Revision::from_record(r, registry))
            .collect();
        *self.quick_stash.write() = record
            .quick_stash
            .as_ref()
            .map(|r| Revision::from_record(r, registry));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StashesRecord {
    #[serde(default)]
    pub user_stashes: Vec<RevisionRecord>,
    #[serde(default)]
    pub quick_stash: Option<RevisionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{document_registry, Document, TRACK};
    use crate::revision_item::{RevisionItem, RevisionItemKind};

    #[test]
    fn test_user_stash_lookup() {
        let stashes = StashesRepository::new();
        let stash = Arc::new(Revision::new("wip drums"));
        stashes.add_stash(Arc::clone(&stash));

        assert_eq!(stashes.num_user_stashes(), 1);
        assert!(stashes.find_user_stash("wip drums").is_some());
        assert!(stashes
            .find_user_stash(&stash.id().to_string()[..8])
            .is_some());
        assert!(stashes.find_user_stash("nope").is_none());

        assert!(stashes.remove_stash(stash.id()));
        assert!(!stashes.remove_stash(stash.id()));
    }

    #[test]
    fn test_quick_stash_slot() {
        let registry = document_registry(&[TRACK]);
        let doc = Document::new(registry.logic_for(TRACK).unwrap(), "Bass");
        let stashes = StashesRepository::new();

        assert!(!stashes.has_quick_stash());
        stashes.store_quick_stash(Arc::new(Revision::new("empty")));
        assert!(!stashes.has_quick_stash());

        let stash = Revision::new("quick");
        stash.add_item(Arc::new(RevisionItem::new(RevisionItemKind::Added, &doc)));
        stashes.store_quick_stash(Arc::new(stash));
        assert!(stashes.has_quick_stash());

        let record = stashes.to_record();
        let restored = StashesRepository::new();
        restored.load_record(&record, &registry);
        assert!(restored.has_quick_stash());

        stashes.reset();
        assert!(!stashes.has_quick_stash());
    }
}
