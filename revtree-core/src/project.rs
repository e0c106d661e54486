//! A reference project: an ordered list of tracked documents.

use crate::document::{Document, NAME_FIELD};
use crate::error::{Error, Result};
use crate::revision_item::{RevisionItem, RevisionItemKind, RevisionItemRecord};
use crate::tracked::{ItemRegistry, ItemState, TrackedItem, TrackedItemsSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct Project {
    id: Uuid,
    title: String,
    registry: Arc<ItemRegistry>,
    items: Vec<Box<dyn TrackedItem>>,
    resetting: bool,
    generation: u64,
}

impl Project {
    pub fn new(title: impl Into<String>, registry: Arc<ItemRegistry>) -> Self {
        Self::with_id(Uuid::new_v4(), title, registry)
    }

    pub fn with_id(id: Uuid, title: impl Into<String>, registry: Arc<ItemRegistry>) -> Self {
        Self {
            id,
            title: title.into(),
            registry,
            items: Vec::new(),
            resetting: false,
            generation: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn registry(&self) -> &Arc<ItemRegistry> {
        &self.registry
    }

    /// True between `on_before_reset_state` and `on_reset_state`.
    pub fn is_resetting(&self) -> bool {
        self.resetting
    }

    pub fn items(&self) -> impl Iterator<Item = &dyn TrackedItem> {
        self.items.iter().map(|item| {
            let item: &dyn TrackedItem = &**item;
            item
        })
    }

    /// Adds a new document of a registered type and returns its uuid.
    pub fn add_document(
        &mut self,
        type_tag: &str,
        name: &str,
        fields: &[(String, Value)],
    ) -> Result<Uuid> {
        let logic = self
            .registry
            .logic_for(type_tag)
            .ok_or_else(|| Error::UnknownItemType(type_tag.to_string()))?;

        let mut document = Document::new(logic, name);
        for (key, value) in fields {
            document.set_field(key, value.clone());
        }

        let id = document.uuid();
        let seed = RevisionItem::new(RevisionItemKind::Added, &document);
        if !self.init_tracked_item(type_tag, id, &seed) {
            return Err(Error::UnknownItemType(type_tag.to_string()));
        }

        Ok(id)
    }

    /// Resolves an item by exact name or uuid prefix.
    pub fn resolve(&self, key: &str) -> Result<Uuid> {
        let by_name: Vec<Uuid> = self
            .items
            .iter()
            .filter(|item| item.vcs_name() == key)
            .map(|item| item.uuid())
            .collect();

        if let [id] = by_name.as_slice() {
            return Ok(*id);
        }

        let by_prefix: Vec<Uuid> = self
            .items
            .iter()
            .map(|item| item.uuid())
            .filter(|id| id.to_string().starts_with(key))
            .collect();

        match by_prefix.as_slice() {
            [id] => Ok(*id),
            [] if by_name.is_empty() => Err(Error::ItemNotFound(key.to_string())),
            _ => Err(Error::InvalidOperation(format!("'{}' is ambiguous", key))),
        }
    }

    /// Sets one field through the item's own state-reset path, so any item
    /// type works, not only documents.
    pub fn set_field(&mut self, id: Uuid, key: &str, value: Value) -> Result<()> {
        let index = self
            .find_tracked_item(id)
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))?;

        self.touch();
        let item = &mut *self.items[index];
        let logic = item.diff_logic();
        let mut document = Document::from_state(id, logic, item.as_item_state());
        document.set_field(key, value);
        item.reset_state_to(&document);
        Ok(())
    }

    pub fn remove_field(&mut self, id: Uuid, key: &str) -> Result<bool> {
        if key == NAME_FIELD {
            return Err(Error::InvalidOperation(
                "the name field cannot be removed".to_string(),
            ));
        }

        let index = self
            .find_tracked_item(id)
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))?;

        self.touch();
        let item = &mut *self.items[index];
        let logic = item.diff_logic();
        let mut document = Document::from_state(id, logic, item.as_item_state());
        let removed = document.remove_field(key);
        item.reset_state_to(&document);
        Ok(removed)
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn to_record(&self) -> ProjectRecord {
        ProjectRecord {
            id: self.id,
            title: self.title.clone(),
            items: self
                .items
                .iter()
                .map(|item| RevisionItem::new(RevisionItemKind::Added, item.as_item_state()))
                .map(|item| item.to_record())
                .collect(),
        }
    }

    /// Items whose type is not registered are skipped.
    pub fn from_record(record: &ProjectRecord, registry: Arc<ItemRegistry>) -> Self {
        let mut project = Self::with_id(record.id, record.title.clone(), registry);

        for item in &record.items {
            match RevisionItem::from_record(item, &project.registry) {
                Ok(seed) => {
                    project.init_tracked_item(&item.diff_logic, item.uuid, &seed);
                }
                Err(e) => warn!("Skipping project item {}: {}", item.uuid, e),
            }
        }

        project
    }
}

impl TrackedItemsSource for Project {
    fn num_tracked_items(&self) -> usize {
        self.items.len()
    }

    fn tracked_item(&self, index: usize) -> Option<&dyn TrackedItem> {
        match self.items.get(index) {
            Some(item) => Some(&**item),
            None => None,
        }
    }

    fn tracked_item_mut(&mut self, index: usize) -> Option<&mut dyn TrackedItem> {
        self.touch();
        match self.items.get_mut(index) {
            Some(item) => Some(&mut **item),
            None => None,
        }
    }

    fn init_tracked_item(&mut self, type_tag: &str, id: Uuid, seed: &dyn ItemState) -> bool {
        if self.find_tracked_item(id).is_some() {
            warn!("Item {} already exists in project {}", id, self.id);
            return false;
        }

        match self.registry.create_item(type_tag, id, seed) {
            Some(item) => {
                debug!("Created {} item {} ({})", type_tag, item.vcs_name(), id);
                self.items.push(item);
                self.touch();
                true
            }
            None => {
                warn!("Unknown item type {} for {}", type_tag, id);
                false
            }
        }
    }

    fn delete_tracked_item(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.uuid() != id);
        let deleted = self.items.len() != before;
        if deleted {
            self.touch();
        }
        deleted
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn on_before_reset_state(&mut self) {
        self.resetting = true;
    }

    fn on_reset_state(&mut self) {
        self.resetting = false;
        debug!("Project {} state reset, {} items", self.id, self.items.len());
    }
}

/// Serialized form of a [`Project`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub items: Vec<RevisionItemRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{document_registry, DEFAULT_TYPES, PATTERN, TRACK};
    use serde_json::json;

    fn project() -> Project {
        Project::new("Demo", Arc::new(document_registry(DEFAULT_TYPES)))
    }

    #[test]
    fn test_add_and_resolve() {
        let mut project = project();
        let bass = project
            .add_document(TRACK, "Bass", &[("volume".to_string(), json!(0.5))])
            .unwrap();
        project.add_document(PATTERN, "Intro", &[]).unwrap();

        assert_eq!(project.num_tracked_items(), 2);
        assert_eq!(project.resolve("Bass").unwrap(), bass);
        assert_eq!(project.resolve(&bass.to_string()[..6]).unwrap(), bass);
        assert!(matches!(project.resolve("Lead"), Err(Error::ItemNotFound(_))));
        assert!(matches!(
            project.add_document("clip", "x", &[]),
            Err(Error::UnknownItemType(_))
        ));
    }

    #[test]
    fn test_set_and_remove_field() {
        let mut project = project();
        let id = project.add_document(TRACK, "Bass", &[]).unwrap();

        project.set_field(id, "volume", json!(0.3)).unwrap();
        let index = project.find_tracked_item(id).unwrap();
        let item = project.tracked_item(index).unwrap();
        assert_eq!(item.find_delta("volume").unwrap().data, json!(0.3));

        assert!(project.remove_field(id, "volume").unwrap());
        assert!(project.remove_field(id, NAME_FIELD).is_err());
        assert!(project.set_field(Uuid::new_v4(), "x", json!(1)).is_err());
    }

    #[test]
    fn test_duplicate_uuid_is_refused() {
        let mut project = project();
        let id = project.add_document(TRACK, "Bass", &[]).unwrap();
        let index = project.find_tracked_item(id).unwrap();
        let seed = RevisionItem::new(
            RevisionItemKind::Added,
            project.tracked_item(index).unwrap().as_item_state(),
        );

        assert!(!project.init_tracked_item(TRACK, id, &seed));
        assert_eq!(project.num_tracked_items(), 1);
        assert!(project.delete_tracked_item(id));
        assert!(!project.delete_tracked_item(id));
    }

    #[test]
    fn test_record_roundtrip() {
        let mut project = project();
        project
            .add_document(TRACK, "Keys", &[("pan".to_string(), json!(-0.2))])
            .unwrap();

        let record = project.to_record();
        let json = serde_json::to_string(&record).unwrap();
        let restored = Project::from_record(
            &serde_json::from_str(&json).unwrap(),
            Arc::clone(project.registry()),
        );

        assert_eq!(restored.to_record(), record);
        assert_eq!(restored.title(), "Demo");
    }
}
