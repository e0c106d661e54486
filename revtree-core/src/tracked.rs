//! Capability contracts between the version-control core and the live project.
//!
//! The project owns its tracked items; the core only reads their deltas, asks
//! their diff logic for comparisons and pushes historical state back through
//! [`TrackedItem::reset_state_to`] and the [`TrackedItemsSource`] hooks.

use crate::delta::Delta;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Read-only view of a versionable object's state.
pub trait ItemState: Send + Sync {
    fn uuid(&self) -> Uuid;

    fn vcs_name(&self) -> &str;

    fn deltas(&self) -> &[Delta];

    fn diff_logic(&self) -> Arc<dyn DiffLogic>;

    fn num_deltas(&self) -> usize {
        self.deltas().len()
    }

    fn delta(&self, index: usize) -> Option<&Delta> {
        self.deltas().get(index)
    }

    fn delta_data(&self, index: usize) -> Option<&Value> {
        self.delta(index).map(|delta| &delta.data)
    }

    fn find_delta(&self, delta_type: &str) -> Option<&Delta> {
        self.deltas().iter().find(|d| d.delta_type == delta_type)
    }
}

/// Lets a `dyn TrackedItem` be handed to APIs that take `&dyn ItemState`.
pub trait AsItemState {
    fn as_item_state(&self) -> &dyn ItemState;
}

impl<T: ItemState> AsItemState for T {
    fn as_item_state(&self) -> &dyn ItemState {
        self
    }
}

/// A live, mutable object inside the project.
pub trait TrackedItem: ItemState + AsItemState {
    fn reset_state_to(&mut self, other: &dyn ItemState);
}

/// Per-type comparison and composition rules.
pub trait DiffLogic: Send + Sync + fmt::Debug {
    fn type_tag(&self) -> &str;

    /// Compares the live `target` against its historical `initial` state.
    fn create_diff(&self, target: &dyn ItemState, initial: &dyn ItemState) -> Diff;

    /// Folds `changes` into `initial`, producing a full-state record.
    ///
    /// Deltas in `changes` replace deltas of the same type, removals drop
    /// them, everything else in `initial` is kept.
    fn create_merged_item(&self, initial: &dyn ItemState, changes: &dyn ItemState) -> Diff {
        let mut deltas: Vec<Delta> = initial.deltas().to_vec();

        for change in changes.deltas() {
            let existing = deltas
                .iter()
                .position(|d| d.delta_type == change.delta_type);

            match existing {
                Some(index) if change.is_removal() => {
                    deltas.remove(index);
                }
                Some(index) => deltas[index] = change.clone(),
                None if change.is_removal() => {}
                None => deltas.push(change.clone()),
            }
        }

        Diff::new(
            initial.uuid(),
            changes.vcs_name(),
            initial.diff_logic(),
            deltas,
        )
    }
}

/// Structural comparison result for one tracked item.
#[derive(Debug, Clone)]
pub struct Diff {
    uuid: Uuid,
    vcs_name: String,
    logic: Arc<dyn DiffLogic>,
    deltas: Vec<Delta>,
}

impl Diff {
    pub fn new(
        uuid: Uuid,
        vcs_name: impl Into<String>,
        logic: Arc<dyn DiffLogic>,
        deltas: Vec<Delta>,
    ) -> Self {
        Self {
            uuid,
            vcs_name: vcs_name.into(),
            logic,
            deltas,
        }
    }

    /// A diff carrying the item's complete state, used for `Removed` records
    /// so the last known state can be restored later.
    pub fn from_item(item: &dyn ItemState) -> Self {
        Self::new(
            item.uuid(),
            item.vcs_name(),
            item.diff_logic(),
            item.deltas().to_vec(),
        )
    }

    pub fn has_any_changes(&self) -> bool {
        !self.deltas.is_empty()
    }
}

impl ItemState for Diff {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn vcs_name(&self) -> &str {
        &self.vcs_name
    }

    fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    fn diff_logic(&self) -> Arc<dyn DiffLogic> {
        Arc::clone(&self.logic)
    }
}

/// The project as seen by the version-control core.
pub trait TrackedItemsSource {
    fn num_tracked_items(&self) -> usize;

    fn tracked_item(&self, index: usize) -> Option<&dyn TrackedItem>;

    fn tracked_item_mut(&mut self, index: usize) -> Option<&mut dyn TrackedItem>;

    /// Creates a live item of `type_tag` seeded from `seed`. Returns `false`
    /// when the type is unknown to the project.
    fn init_tracked_item(&mut self, type_tag: &str, id: Uuid, seed: &dyn ItemState) -> bool;

    fn delete_tracked_item(&mut self, id: Uuid) -> bool;

    /// A counter that moves whenever any tracked item may have changed,
    /// including every mutable borrow of an item.
    fn generation(&self) -> u64;

    fn on_before_reset_state(&mut self) {}

    fn on_reset_state(&mut self) {}

    fn find_tracked_item(&self, id: Uuid) -> Option<usize> {
        (0..self.num_tracked_items()).find(|&index| {
            self.tracked_item(index)
                .map(|item| item.uuid() == id)
                .unwrap_or(false)
        })
    }
}

pub type ItemFactory =
    Arc<dyn Fn(Uuid, &dyn ItemState) -> Box<dyn TrackedItem> + Send + Sync>;

#[derive(Clone)]
struct RegistryEntry {
    logic: Arc<dyn DiffLogic>,
    factory: ItemFactory,
}

/// Type tag -> diff logic and item factory.
#[derive(Clone, Default)]
pub struct ItemRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, logic: Arc<dyn DiffLogic>, factory: ItemFactory) {
        let tag = logic.type_tag().to_string();
        self.entries.insert(tag, RegistryEntry { logic, factory });
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.entries.contains_key(type_tag)
    }

    pub fn logic_for(&self, type_tag: &str) -> Option<Arc<dyn DiffLogic>> {
        self.entries
            .get(type_tag)
            .map(|entry| Arc::clone(&entry.logic))
    }

    pub fn create_item(
        &self,
        type_tag: &str,
        id: Uuid,
        seed: &dyn ItemState,
    ) -> Option<Box<dyn TrackedItem>> {
        self.entries
            .get(type_tag)
            .map(|entry| (entry.factory)(id, seed))
    }

    pub fn type_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl fmt::Debug for ItemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemRegistry")
            .field("types", &self.type_tags())
            .finish()
    }
}
