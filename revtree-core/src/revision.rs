//! The revision tree.
//!
//! Nodes own their children through `Arc`; the parent link is a `Weak`
//! back-reference so the tree never forms ownership cycles. Each node carries
//! its own locks because a sync worker may graft subtrees or backfill payloads
//! while the UI thread walks the tree.

use crate::revision_item::{RevisionItem, RevisionItemRecord};
use crate::tracked::{ItemRegistry, ItemState};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug)]
pub struct Revision {
    id: Uuid,
    message: String,
    timestamp: i64,
    shallow: AtomicBool,
    parent: RwLock<Weak<Revision>>,
    children: RwLock<Vec<Arc<Revision>>>,
    items: RwLock<Vec<Arc<RevisionItem>>>,
}

impl Revision {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), message, Utc::now().timestamp_millis())
    }

    pub fn with_id(id: Uuid, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id,
            message: message.into(),
            timestamp,
            shallow: AtomicBool::new(false),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            items: RwLock::new(Vec::new()),
        }
    }

    /// A node known only by its metadata; the payload is fetched later.
    pub fn shallow(id: Uuid, message: impl Into<String>, timestamp: i64) -> Self {
        let revision = Self::with_id(id, message, timestamp);
        revision.shallow.store(true, Ordering::SeqCst);
        revision
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }

    pub fn is_shallow(&self) -> bool {
        self.shallow.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty() && self.children.read().is_empty()
    }

    pub fn parent(&self) -> Option<Arc<Revision>> {
        self.parent.read().upgrade()
    }

    /// Whether this node still hangs off a live parent.
    pub fn is_attached(&self) -> bool {
        self.parent().is_some()
    }

    pub fn children(&self) -> Vec<Arc<Revision>> {
        self.children.read().clone()
    }

    pub fn items(&self) -> Vec<Arc<RevisionItem>> {
        self.items.read().clone()
    }

    pub fn add_child(self: &Arc<Self>, child: Arc<Revision>) {
        *child.parent.write() = Arc::downgrade(self);
        self.children.write().push(child);
    }

    /// Adds a record, replacing any record for the same tracked item.
    pub fn add_item(&self, item: Arc<RevisionItem>) {
        let mut items = self.items.write();
        match items.iter().position(|i| i.uuid() == item.uuid()) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }
    }

    /// Replaces the whole payload and clears the shallow marker.
    pub fn replace_items(&self, items: Vec<Arc<RevisionItem>>) {
        let mut unique: Vec<Arc<RevisionItem>> = Vec::with_capacity(items.len());
        for item in items {
            match unique.iter().position(|i| i.uuid() == item.uuid()) {
                Some(index) => unique[index] = item,
                None => unique.push(item),
            }
        }

        *self.items.write() = unique;
        self.shallow.store(false, Ordering::SeqCst);
    }

    pub fn find(self: &Arc<Self>, id: Uuid) -> Option<Arc<Revision>> {
        if self.id == id {
            return Some(Arc::clone(self));
        }

        self.children().iter().find_map(|child| child.find(id))
    }

    /// Pre-order walk: node first, then its children in insertion order.
    pub fn preorder(self: &Arc<Self>) -> Vec<Arc<Revision>> {
        let mut out = Vec::new();
        let mut stack = vec![Arc::clone(self)];

        while let Some(node) = stack.pop() {
            let children = node.children();
            out.push(node);
            stack.extend(children.into_iter().rev());
        }

        out
    }

    /// Root first, `self` last.
    pub fn path_from_root(self: &Arc<Self>) -> Vec<Arc<Revision>> {
        let mut path = vec![Arc::clone(self)];
        let mut current = self.parent();

        while let Some(revision) = current {
            current = revision.parent();
            path.push(revision);
        }

        path.reverse();
        path
    }

    pub fn items_to_records(&self) -> Vec<RevisionItemRecord> {
        self.items.read().iter().map(|i| i.to_record()).collect()
    }

    pub fn to_record(&self) -> RevisionRecord {
        RevisionRecord {
            id: self.id,
            message: self.message.clone(),
            timestamp: self.timestamp,
            shallow: self.is_shallow(),
            items: self.items_to_records(),
            children: self.children.read().iter().map(|c| c.to_record()).collect(),
        }
    }

    /// Rebuilds a subtree. Records of unknown item types are skipped.
    pub fn from_record(record: &RevisionRecord, registry: &ItemRegistry) -> Arc<Revision> {
        let revision = Arc::new(Revision::with_id(
            record.id,
            record.message.clone(),
            record.timestamp,
        ));
        revision.shallow.store(record.shallow, Ordering::SeqCst);

        for item in records_to_items(&record.items, registry) {
            revision.add_item(item);
        }

        for child in &record.children {
            revision.add_child(Revision::from_record(child, registry));
        }

        revision
    }
}

pub(crate) fn records_to_items(
    records: &[RevisionItemRecord],
    registry: &ItemRegistry,
) -> Vec<Arc<RevisionItem>> {
    records
        .iter()
        .filter_map(|record| match RevisionItem::from_record(record, registry) {
            Ok(item) => Some(Arc::new(item)),
            Err(e) => {
                warn!("Skipping revision item {}: {}", record.uuid, e);
                None
            }
        })
        .collect()
}

/// Serialized form of a revision and its whole subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub id: Uuid,
    pub message: String,
    pub timestamp: i64,
    #[serde(default)]
    pub shallow: bool,
    #[serde(default)]
    pub items: Vec<RevisionItemRecord>,
    #[serde(default)]
    pub children: Vec<RevisionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{document_registry, Document, TRACK};
    use crate::revision_item::RevisionItemKind;

    fn chain() -> (Arc<Revision>, Arc<Revision>, Arc<Revision>) {
        let root = Arc::new(Revision::new("root"));
        let a = Arc::new(Revision::new("a"));
        let b = Arc::new(Revision::new("b"));
        root.add_child(Arc::clone(&a));
        a.add_child(Arc::clone(&b));
        (root, a, b)
    }

    #[test]
    fn test_parent_links() {
        let (root, a, b) = chain();

        assert!(root.parent().is_none());
        assert_eq!(b.parent().unwrap().id(), a.id());
        assert!(a.is_attached());
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn test_parent_is_not_owned() {
        let child = {
            let root = Arc::new(Revision::new("root"));
            let child = Arc::new(Revision::new("child"));
            root.add_child(Arc::clone(&child));
            child
        };

        assert!(!child.is_attached());
    }

    #[test]
    fn test_find_and_path() {
        let (root, a, b) = chain();
        let sibling = Arc::new(Revision::new("sibling"));
        root.add_child(Arc::clone(&sibling));

        assert_eq!(root.find(b.id()).unwrap().id(), b.id());
        assert!(root.find(Uuid::new_v4()).is_none());

        let path: Vec<Uuid> = b.path_from_root().iter().map(|r| r.id()).collect();
        assert_eq!(path, vec![root.id(), a.id(), b.id()]);

        let order: Vec<Uuid> = root.preorder().iter().map(|r| r.id()).collect();
        assert_eq!(order, vec![root.id(), a.id(), b.id(), sibling.id()]);
    }

    #[test]
    fn test_one_item_per_tracked_uuid() {
        let registry = document_registry(&[TRACK]);
        let doc = Document::new(registry.logic_for(TRACK).unwrap(), "Bass");
        let revision = Revision::new("r");

        revision.add_item(Arc::new(RevisionItem::new(RevisionItemKind::Added, &doc)));
        revision.add_item(Arc::new(RevisionItem::new(RevisionItemKind::Changed, &doc)));

        let items = revision.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind(), RevisionItemKind::Changed);
    }

    #[test]
    fn test_shallow_backfill() {
        let registry = document_registry(&[TRACK]);
        let doc = Document::new(registry.logic_for(TRACK).unwrap(), "Bass");
        let revision = Revision::shallow(Uuid::new_v4(), "remote", 0);

        assert!(revision.is_shallow());
        revision.replace_items(vec![Arc::new(RevisionItem::new(
            RevisionItemKind::Added,
            &doc,
        ))]);

        assert!(!revision.is_shallow());
        assert_eq!(revision.items().len(), 1);
    }

    #[test]
    fn test_record_roundtrip_keeps_shape() {
        let registry = document_registry(&[TRACK]);
        let (root, a, b) = chain();
        let doc = Document::new(registry.logic_for(TRACK).unwrap(), "Bass");
        a.add_item(Arc::new(RevisionItem::new(RevisionItemKind::Added, &doc)));

        let record = root.to_record();
        let restored = Revision::from_record(&record, &registry);

        assert_eq!(restored.to_record(), record);
        let restored_b = restored.find(b.id()).unwrap();
        assert_eq!(restored_b.parent().unwrap().id(), a.id());
        assert_eq!(restored.find(a.id()).unwrap().items().len(), 1);
    }
}
