//! Per-project version control facade.
//!
//! Owns the revision tree, the head, the stashes and the remote sync cache.
//! The live project is borrowed for the duration of each call.

use crate::error::{Error, Result};
use crate::head::{Head, HeadRecord};
use crate::revision::{records_to_items, Revision, RevisionRecord};
use crate::revision_item::{RevisionItem, RevisionItemKind, RevisionItemRecord};
use crate::stash::{StashesRecord, StashesRepository};
use crate::sync::RevisionDto;
use crate::tracked::{ItemRegistry, ItemState, TrackedItemsSource};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const INITIAL_REVISION_MESSAGE: &str = "initial revision";

/// How much of a revision is known to exist on the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Full payload locally and the id is known remotely.
    FullSync,
    /// Metadata only; the payload has not been fetched yet.
    ShallowCopy,
    /// Local only.
    NoSync,
}

#[derive(Debug)]
pub struct VersionControl {
    registry: Arc<ItemRegistry>,
    root: RwLock<Arc<Revision>>,
    head: Head,
    stashes: StashesRepository,
    remote_cache: RwLock<BTreeSet<Uuid>>,
}

impl VersionControl {
    pub fn new(registry: Arc<ItemRegistry>) -> Self {
        let root = Arc::new(Revision::new(INITIAL_REVISION_MESSAGE));
        let head = Head::new(&root);
        head.move_to(&root);

        Self {
            registry,
            root: RwLock::new(root),
            head,
            stashes: StashesRepository::new(),
            remote_cache: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ItemRegistry> {
        &self.registry
    }

    pub fn root(&self) -> Arc<Revision> {
        Arc::clone(&self.root.read())
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn stashes(&self) -> &StashesRepository {
        &self.stashes
    }

    pub fn heading_revision(&self) -> Arc<Revision> {
        self.head
            .heading_revision()
            .unwrap_or_else(|| self.root())
    }

    pub fn find_revision(&self, id: Uuid) -> Option<Arc<Revision>> {
        self.root().find(id)
    }

    /// Resolves a revision by id prefix.
    pub fn resolve_revision(&self, prefix: &str) -> Result<Arc<Revision>> {
        let matches: Vec<Arc<Revision>> = self
            .revisions()
            .into_iter()
            .filter(|r| r.id().to_string().starts_with(prefix))
            .collect();

        match matches.len() {
            0 => Err(Error::RevisionNotFound(prefix.to_string())),
            1 => Ok(Arc::clone(&matches[0])),
            n => Err(Error::InvalidOperation(format!(
                "revision prefix '{}' matches {} revisions",
                prefix, n
            ))),
        }
    }

    /// Every revision of the tree, root first, in pre-order.
    pub fn revisions(&self) -> Vec<Arc<Revision>> {
        self.root().preorder()
    }

    /// Signals that the live project changed since the last diff.
    pub fn mark_project_changed(&self) {
        self.head.set_diff_outdated(true);
    }

    /// Current changes between the head state and the live project.
    pub fn diff(&self, project: &dyn TrackedItemsSource) -> Arc<Revision> {
        self.head.rebuild_diff_if_needed(project);
        self.head.diff()
    }

    fn fresh_diff(&self, project: &dyn TrackedItemsSource) -> Arc<Revision> {
        self.head.rebuild_diff_now(project);
        self.head.diff()
    }

    pub fn commit(
        &self,
        project: &dyn TrackedItemsSource,
        selected: &[usize],
        message: &str,
    ) -> Result<Arc<Revision>> {
        let diff = self.fresh_diff(project);
        let items = select_items(&diff, selected)?;

        let revision = Arc::new(Revision::new(message));
        for item in items {
            revision.add_item(item);
        }

        self.heading_revision().add_child(Arc::clone(&revision));
        self.head.move_to(&revision);

        info!(
            "Committed revision {} with {} items",
            revision.id(),
            revision.items().len()
        );
        Ok(revision)
    }

    pub fn commit_all(
        &self,
        project: &dyn TrackedItemsSource,
        message: &str,
    ) -> Result<Arc<Revision>> {
        let diff = self.fresh_diff(project);
        let all: Vec<usize> = (0..diff.items().len()).collect();
        self.commit(project, &all, message)
    }

    pub fn move_head(&self, revision: &Arc<Revision>) -> Result<()> {
        ensure_materializable(revision)?;
        self.head.move_to(revision);
        Ok(())
    }

    pub fn checkout(
        &self,
        project: &mut dyn TrackedItemsSource,
        revision: &Arc<Revision>,
    ) -> Result<()> {
        ensure_materializable(revision)?;
        self.head.move_to(revision);
        self.head.checkout(project);
        info!("Checked out revision {}", revision.id());
        Ok(())
    }

    /// Restores the listed items as they were at `revision`, leaving the head
    /// where it was.
    pub fn cherry_pick(
        &self,
        project: &mut dyn TrackedItemsSource,
        revision: &Arc<Revision>,
        uuids: &[Uuid],
    ) -> Result<()> {
        ensure_materializable(revision)?;
        let heading = self.heading_revision();

        self.head.move_to(revision);
        self.head.cherry_pick(project, uuids);
        self.head.move_to(&heading);
        Ok(())
    }

    pub fn reset_changes(
        &self,
        project: &mut dyn TrackedItemsSource,
        selected: &[usize],
    ) -> Result<()> {
        let diff = self.fresh_diff(project);
        let items = select_items(&diff, selected)?;
        self.head.reset_changes(project, &items);
        Ok(())
    }

    pub fn reset_all_changes(&self, project: &mut dyn TrackedItemsSource) -> bool {
        let diff = self.fresh_diff(project);
        self.head.reset_changes(project, &diff.items())
    }

    /// Writes the item's current state straight into the heading revision.
    pub fn quick_amend_item(&self, item: &dyn ItemState) {
        let heading = self.heading_revision();
        heading.add_item(Arc::new(RevisionItem::new(RevisionItemKind::Added, item)));
        self.head.move_to(&heading);
        debug!("Amended {} into {}", item.uuid(), heading.id());
    }

    pub fn stash(
        &self,
        project: &mut dyn TrackedItemsSource,
        selected: &[usize],
        message: &str,
        keep_changes: bool,
    ) -> Result<Arc<Revision>> {
        let diff = self.fresh_diff(project);
        let items = select_items(&diff, selected)?;

        let stash = Arc::new(Revision::new(message));
        for item in &items {
            stash.add_item(Arc::clone(item));
        }
        self.stashes.add_stash(Arc::clone(&stash));

        if !keep_changes {
            self.head.reset_changes(project, &items);
        }

        info!("Stashed {} items as {}", items.len(), stash.id());
        Ok(stash)
    }

    pub fn apply_stash(
        &self,
        project: &mut dyn TrackedItemsSource,
        key: &str,
        keep_stash: bool,
    ) -> Result<()> {
        let stash = self
            .stashes
            .find_user_stash(key)
            .ok_or_else(|| Error::StashNotFound(key.to_string()))?;

        self.apply_stash_revision(project, &stash)?;

        if !keep_stash {
            self.stashes.remove_stash(stash.id());
        }
        Ok(())
    }

    pub fn has_quick_stash(&self) -> bool {
        self.stashes.has_quick_stash()
    }

    /// Moves every current change into the quick stash.
    pub fn quick_stash_all(&self, project: &mut dyn TrackedItemsSource) -> Result<()> {
        if self.has_quick_stash() {
            return Err(Error::InvalidOperation(
                "the quick stash already holds changes".to_string(),
            ));
        }

        let diff = self.fresh_diff(project);
        if diff.items().is_empty() {
            return Err(Error::EmptySelection);
        }

        let stash = Arc::new(Revision::new("quick stash"));
        for item in diff.items() {
            stash.add_item(item);
        }
        self.stashes.store_quick_stash(stash);
        self.head.reset_changes(project, &diff.items());
        Ok(())
    }

    pub fn apply_quick_stash(&self, project: &mut dyn TrackedItemsSource) -> Result<()> {
        let stash = match self.stashes.quick_stash() {
            Some(stash) if !stash.items().is_empty() => stash,
            _ => return Err(Error::StashNotFound("quick stash".to_string())),
        };

        self.apply_stash_revision(project, &stash)?;
        self.stashes.reset_quick_stash();
        Ok(())
    }

    // Replays the stash on a scratch head so that changed records are merged
    // onto the current state rather than onto an empty one.
    fn apply_stash_revision(
        &self,
        project: &mut dyn TrackedItemsSource,
        stash: &Arc<Revision>,
    ) -> Result<()> {
        if stash.items().is_empty() {
            return Err(Error::InvalidOperation(format!(
                "stash {} is empty",
                stash.id()
            )));
        }

        let scratch = self.head.detached_copy();
        scratch.merge_state_with(stash);

        let (removed, picked): (Vec<_>, Vec<_>) = stash
            .items()
            .into_iter()
            .partition(|item| item.kind() == RevisionItemKind::Removed);

        let uuids: Vec<Uuid> = picked.iter().map(|item| item.uuid()).collect();
        scratch.cherry_pick(project, &uuids);

        if !removed.is_empty() {
            project.on_before_reset_state();
            for item in &removed {
                project.delete_tracked_item(item.uuid());
            }
            project.on_reset_state();
        }

        self.head.set_diff_outdated(true);
        debug!("Applied stash {}", stash.id());
        Ok(())
    }

    /// Grafts a subtree under `parent_id`. Without a parent the subtree
    /// becomes the new root, which is only allowed while the local tree is
    /// pristine.
    pub fn append_subtree(&self, subtree: Arc<Revision>, parent_id: Option<Uuid>) -> bool {
        if self.find_revision(subtree.id()).is_some() {
            warn!("Revision {} is already in the tree", subtree.id());
            return false;
        }

        match parent_id {
            None => {
                let root = self.root();
                if !root.is_empty() {
                    warn!(
                        "Skipping parentless subtree {}: local history is not empty",
                        subtree.id()
                    );
                    return false;
                }

                *self.root.write() = Arc::clone(&subtree);
                self.head.move_to(&subtree);
                info!("Replaced pristine root with {}", subtree.id());
                true
            }
            Some(parent_id) => match self.find_revision(parent_id) {
                Some(parent) => {
                    parent.add_child(subtree);
                    true
                }
                None => {
                    warn!(
                        "Skipping orphan subtree {}: parent {} is unknown",
                        subtree.id(),
                        parent_id
                    );
                    false
                }
            },
        }
    }

    /// Fills in the payload of a shallow revision.
    pub fn update_shallow_revision_data(
        &self,
        id: Uuid,
        records: &[RevisionItemRecord],
    ) -> Option<Arc<Revision>> {
        let revision = self.find_revision(id)?;
        revision.replace_items(records_to_items(records, &self.registry));

        let heading = self.heading_revision();
        let on_head_path = heading
            .path_from_root()
            .iter()
            .any(|step| step.id() == id);

        if on_head_path {
            self.head.move_to(&heading);
        }

        self.head.set_diff_outdated(true);
        Some(revision)
    }

    pub fn update_remote_sync_cache(&self, revisions: &[RevisionDto]) {
        let mut cache = self.remote_cache.write();
        cache.clear();
        cache.extend(revisions.iter().map(|dto| dto.id));
    }

    pub fn update_local_sync_cache(&self, revision: &Revision) {
        self.remote_cache.write().insert(revision.id());
    }

    pub fn revision_sync_state(&self, revision: &Revision) -> SyncState {
        if revision.is_shallow() {
            SyncState::ShallowCopy
        } else if self.remote_cache.read().contains(&revision.id()) {
            SyncState::FullSync
        } else {
            SyncState::NoSync
        }
    }

    /// SHA-256 over the serialized tree, hex encoded.
    pub fn calculate_hash(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.root().to_record())?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    pub fn to_record(&self) -> VersionControlRecord {
        VersionControlRecord {
            head_revision_id: self.heading_revision().id(),
            root: self.root().to_record(),
            stashes: self.stashes.to_record(),
            head: self.head.serialize(),
            remote_cache: self.remote_cache.read().iter().copied().collect(),
        }
    }

    pub fn from_record(record: &VersionControlRecord, registry: Arc<ItemRegistry>) -> Self {
        let root = Revision::from_record(&record.root, &registry);
        let head = Head::new(&root);
        head.deserialize(&record.head, &registry);

        match root.find(record.head_revision_id) {
            Some(revision) => head.point_to(&revision),
            None => {
                warn!(
                    "Head revision {} not found, moving to root",
                    record.head_revision_id
                );
                head.move_to(&root);
            }
        }

        let stashes = StashesRepository::new();
        stashes.load_record(&record.stashes, &registry);

        Self {
            registry,
            root: RwLock::new(root),
            head,
            stashes,
            remote_cache: RwLock::new(record.remote_cache.iter().copied().collect()),
        }
    }
}

fn select_items(diff: &Revision, selected: &[usize]) -> Result<Vec<Arc<RevisionItem>>> {
    if selected.is_empty() {
        return Err(Error::EmptySelection);
    }

    let all = diff.items();
    selected
        .iter()
        .map(|&index| {
            all.get(index).cloned().ok_or(Error::InvalidSelection {
                index,
                len: all.len(),
            })
        })
        .collect()
}

fn ensure_materializable(revision: &Arc<Revision>) -> Result<()> {
    if revision.is_empty() {
        return Err(Error::InvalidOperation(format!(
            "revision {} is empty",
            revision.id()
        )));
    }

    if revision.path_from_root().iter().any(|step| step.is_shallow()) {
        return Err(Error::InvalidOperation(format!(
            "revision {} has not been fully fetched",
            revision.id()
        )));
    }

    Ok(())
}

/// Serialized form of a [`VersionControl`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionControlRecord {
    pub head_revision_id: Uuid,
    pub root: RevisionRecord,
    #[serde(default)]
    pub stashes: StashesRecord,
    #[serde(default)]
    pub head: HeadRecord,
    #[serde(default)]
    pub remote_cache: Vec<Uuid>,
}
