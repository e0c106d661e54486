//! The movable cursor into the revision tree.
//!
//! `Head` keeps the snapshot reconstructed for the revision it points at and
//! a cached diff between that snapshot and the live project. The project is
//! passed into every operation; `Head` never holds on to it.

use crate::revision::{records_to_items, Revision};
use crate::revision_item::{RevisionItem, RevisionItemKind};
use crate::snapshot::{Snapshot, SnapshotRecord};
use crate::tracked::{Diff, ItemRegistry, ItemState, TrackedItemsSource};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// The heading pointer and the snapshot reconstructed for it, always
/// replaced together.
#[derive(Debug, Clone)]
struct Cursor {
    heading_at: Weak<Revision>,
    state: Snapshot,
}

#[derive(Debug)]
pub struct Head {
    cursor: RwLock<Cursor>,
    diff: RwLock<Arc<Revision>>,
    diff_outdated: AtomicBool,
    /// Project generation the cached diff was built against.
    diff_generation: AtomicU64,
    rebuilding: AtomicBool,
}

const NEVER_BUILT: u64 = u64::MAX;

impl Head {
    /// A head pointing at `revision` with an empty state; call
    /// [`Head::move_to`] to reconstruct it.
    pub fn new(revision: &Arc<Revision>) -> Self {
        Self {
            cursor: RwLock::new(Cursor {
                heading_at: Arc::downgrade(revision),
                state: Snapshot::new(),
            }),
            diff: RwLock::new(Arc::new(Revision::new("diff"))),
            diff_outdated: AtomicBool::new(true),
            diff_generation: AtomicU64::new(NEVER_BUILT),
            rebuilding: AtomicBool::new(false),
        }
    }

    /// A scratch copy sharing the heading revision, with its own state.
    pub fn detached_copy(&self) -> Head {
        Self {
            cursor: RwLock::new(self.cursor.read().clone()),
            diff: RwLock::new(self.diff()),
            diff_outdated: AtomicBool::new(self.is_diff_outdated()),
            diff_generation: AtomicU64::new(self.diff_generation.load(Ordering::SeqCst)),
            rebuilding: AtomicBool::new(false),
        }
    }

    pub fn heading_revision(&self) -> Option<Arc<Revision>> {
        self.cursor.read().heading_at.upgrade()
    }

    pub fn state(&self) -> Snapshot {
        self.cursor.read().state.clone()
    }

    /// The last built diff. Call [`Head::rebuild_diff_if_needed`] first when
    /// the project may have changed.
    pub fn diff(&self) -> Arc<Revision> {
        Arc::clone(&self.diff.read())
    }

    pub fn has_anything_on_the_stage(&self) -> bool {
        !self.diff.read().items().is_empty()
    }

    pub fn has_tracked_items_on_the_stage(&self) -> bool {
        self.diff
            .read()
            .items()
            .iter()
            .any(|item| item.kind() != RevisionItemKind::Added)
    }

    pub fn is_diff_outdated(&self) -> bool {
        self.diff_outdated.load(Ordering::SeqCst)
    }

    pub fn set_diff_outdated(&self, outdated: bool) {
        self.diff_outdated.store(outdated, Ordering::SeqCst);
    }

    pub fn is_rebuilding_diff(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    /// Applies the records of `changes` on top of the current state without
    /// moving the head.
    pub fn merge_state_with(&self, changes: &Revision) {
        debug!("Merging head state with {}", changes.id());
        let mut cursor = self.cursor.write();
        for item in changes.items() {
            apply_record(&mut cursor.state, &item);
        }
        self.set_diff_outdated(true);
    }

    /// Rebuilds the state by replaying every revision from the root down to
    /// `revision`.
    pub fn move_to(&self, revision: &Arc<Revision>) {
        let mut state = Snapshot::new();

        for step in revision.path_from_root() {
            debug!("Replaying revision {}", step.id());
            for item in step.items() {
                apply_record(&mut state, &item);
            }
        }

        *self.cursor.write() = Cursor {
            heading_at: Arc::downgrade(revision),
            state,
        };
        self.set_diff_outdated(true);
    }

    /// Moves the pointer only. The caller vouches that the state matches.
    pub fn point_to(&self, revision: &Arc<Revision>) {
        self.cursor.write().heading_at = Arc::downgrade(revision);
        self.set_diff_outdated(true);
    }

    /// Makes the live project a materialization of the current state.
    ///
    /// Live items absent from the state are deleted; the rest are reset in
    /// place or recreated from their snapshot records.
    pub fn checkout(&self, project: &mut dyn TrackedItemsSource) {
        let cursor = self.cursor.read();
        let state = &cursor.state;
        project.on_before_reset_state();

        let stale: Vec<Uuid> = (0..project.num_tracked_items())
            .filter_map(|index| project.tracked_item(index).map(|item| item.uuid()))
            .filter(|id| !state.contains(*id))
            .collect();

        for id in stale {
            project.delete_tracked_item(id);
        }

        for item in state.iter() {
            checkout_item(project, item);
        }

        project.on_reset_state();
        self.set_diff_outdated(true);
    }

    pub fn cherry_pick(&self, project: &mut dyn TrackedItemsSource, uuids: &[Uuid]) {
        let cursor = self.cursor.read();
        let state = &cursor.state;
        project.on_before_reset_state();

        for item in state.iter().filter(|item| uuids.contains(&item.uuid())) {
            checkout_item(project, item);
        }

        project.on_reset_state();
        self.set_diff_outdated(true);
    }

    pub fn cherry_pick_all(&self, project: &mut dyn TrackedItemsSource) {
        let cursor = self.cursor.read();
        let state = &cursor.state;
        project.on_before_reset_state();

        for item in state.iter() {
            checkout_item(project, item);
        }

        project.on_reset_state();
        self.set_diff_outdated(true);
    }

    /// Reverts the given diff records on the live project.
    pub fn reset_changes(
        &self,
        project: &mut dyn TrackedItemsSource,
        changes: &[Arc<RevisionItem>],
    ) -> bool {
        project.on_before_reset_state();

        for item in changes {
            self.reset_changed_item_to_state(project, item);
        }

        project.on_reset_state();
        self.set_diff_outdated(true);
        true
    }

    /// Pushes the historical state behind one diff record back onto the
    /// live project.
    pub fn reset_changed_item_to_state(
        &self,
        project: &mut dyn TrackedItemsSource,
        diff_item: &RevisionItem,
    ) -> bool {
        let cursor = self.cursor.read();
        let state = &cursor.state;
        let source = state.get(diff_item.uuid());
        let target = project.find_tracked_item(diff_item.uuid());

        match diff_item.kind() {
            RevisionItemKind::Changed => match (source, target) {
                (Some(source), Some(index)) => match project.tracked_item_mut(index) {
                    Some(live) => {
                        live.reset_state_to(&**source);
                        true
                    }
                    None => false,
                },
                _ => {
                    warn!(
                        "Cannot reset {}: missing in snapshot or project",
                        diff_item.uuid()
                    );
                    false
                }
            },
            RevisionItemKind::Added => match target {
                Some(_) => project.delete_tracked_item(diff_item.uuid()),
                None => false,
            },
            RevisionItemKind::Removed => {
                // the removed record carries the full last-known state too
                let seed: &dyn ItemState = match source {
                    Some(source) => &**source,
                    None => diff_item,
                };
                let created =
                    project.init_tracked_item(diff_item.diff_logic_type(), diff_item.uuid(), seed);
                if !created {
                    warn!(
                        "Project refused to recreate {} of type {}",
                        diff_item.uuid(),
                        diff_item.diff_logic_type()
                    );
                }
                created
            }
            RevisionItemKind::Undefined => {
                debug_assert!(false, "undefined revision item kind in diff");
                warn!("Ignoring diff record {} of undefined kind", diff_item.uuid());
                false
            }
        }
    }

    /// Rebuilds when flagged outdated or when the project changed since the
    /// last build.
    pub fn rebuild_diff_if_needed(&self, project: &dyn TrackedItemsSource) {
        let stale = self.diff_generation.load(Ordering::SeqCst) != project.generation();
        if self.is_diff_outdated() || stale {
            self.rebuild_diff(project);
        }
    }

    pub fn rebuild_diff_now(&self, project: &dyn TrackedItemsSource) {
        self.rebuild_diff(project);
    }

    fn rebuild_diff(&self, project: &dyn TrackedItemsSource) {
        if self.rebuilding.swap(true, Ordering::SeqCst) {
            debug!("Diff rebuild already in progress");
            return;
        }

        let generation = project.generation();
        let cursor = self.cursor.read();
        let state = &cursor.state;
        let diff = Revision::new("diff");

        for state_item in state.iter() {
            // removed records are matched against the project below
            if state_item.kind() == RevisionItemKind::Removed {
                continue;
            }

            let live = project
                .find_tracked_item(state_item.uuid())
                .and_then(|index| project.tracked_item(index));

            match live {
                Some(live) => {
                    let item_diff = live
                        .diff_logic()
                        .create_diff(live.as_item_state(), &**state_item);
                    if item_diff.has_any_changes() {
                        diff.add_item(Arc::new(RevisionItem::new(
                            RevisionItemKind::Changed,
                            &item_diff,
                        )));
                    }
                }
                None => {
                    let empty_diff = Diff::from_item(&**state_item);
                    diff.add_item(Arc::new(RevisionItem::new(
                        RevisionItemKind::Removed,
                        &empty_diff,
                    )));
                }
            }
        }

        for index in 0..project.num_tracked_items() {
            let Some(live) = project.tracked_item(index) else {
                continue;
            };

            let tracked = state
                .iter()
                .any(|s| s.kind() != RevisionItemKind::Removed && s.uuid() == live.uuid());

            if !tracked {
                diff.add_item(Arc::new(RevisionItem::new(
                    RevisionItemKind::Added,
                    live.as_item_state(),
                )));
            }
        }

        *self.diff.write() = Arc::new(diff);
        drop(cursor);

        self.diff_generation.store(generation, Ordering::SeqCst);
        self.set_diff_outdated(false);
        self.rebuilding.store(false, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.cursor.write().state = Snapshot::new();
        self.set_diff_outdated(true);
    }

    pub fn serialize(&self) -> HeadRecord {
        HeadRecord {
            snapshot: self.cursor.read().state.to_record(),
        }
    }

    /// Loads a saved snapshot; every record is treated as `Added`.
    pub fn deserialize(&self, record: &HeadRecord, registry: &ItemRegistry) {
        let mut state = Snapshot::new();
        for item in records_to_items(&record.snapshot.items, registry) {
            state.add_item(Arc::new(item.with_kind(RevisionItemKind::Added)));
        }

        self.cursor.write().state = state;
        self.set_diff_outdated(true);
    }
}

fn apply_record(state: &mut Snapshot, item: &Arc<RevisionItem>) {
    match item.kind() {
        RevisionItemKind::Added => state.add_item(Arc::clone(item)),
        RevisionItemKind::Removed => state.remove_item(item),
        RevisionItemKind::Changed => state.merge_item(item),
        RevisionItemKind::Undefined => {
            debug_assert!(false, "undefined revision item kind in history");
            warn!("Ignoring history record {} of undefined kind", item.uuid());
        }
    }
}

fn checkout_item(project: &mut dyn TrackedItemsSource, state_item: &Arc<RevisionItem>) {
    let target = project.find_tracked_item(state_item.uuid());

    match state_item.kind() {
        RevisionItemKind::Changed => {
            if let Some(index) = target {
                if let Some(live) = project.tracked_item_mut(index) {
                    live.reset_state_to(&**state_item);
                }
            }
        }
        RevisionItemKind::Added => {
            let live = match target {
                Some(index) => project.tracked_item_mut(index),
                None => None,
            };

            match live {
                Some(live) => live.reset_state_to(&**state_item),
                None => {
                    let type_tag = state_item.diff_logic_type();
                    if !project.init_tracked_item(type_tag, state_item.uuid(), &**state_item) {
                        warn!(
                            "No item type {} in project; skipped {}",
                            type_tag,
                            state_item.uuid()
                        );
                    }
                }
            }
        }
        RevisionItemKind::Removed => {
            if target.is_some() {
                project.delete_tracked_item(state_item.uuid());
            }
        }
        RevisionItemKind::Undefined => {
            debug_assert!(false, "undefined revision item kind in snapshot");
            warn!("Ignoring snapshot record {} of undefined kind", state_item.uuid());
        }
    }
}

/// Serialized form of the head: its snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadRecord {
    #[serde(default)]
    pub snapshot: SnapshotRecord,
}
