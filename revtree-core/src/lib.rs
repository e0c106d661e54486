//! # revtree-core
//!
//! Core library for revtree - an embedded version-control engine for
//! structured project data.
//!
//! This crate provides the revision tree, the head with its snapshot and
//! cached diff, stashes, SQLite-backed storage and the reconciliation of a
//! local revision tree with a remote copy.

pub mod delta;
pub mod diff;
pub mod document;
pub mod error;
pub mod head;
pub mod project;
pub mod revision;
pub mod revision_item;
pub mod snapshot;
pub mod stash;
pub mod storage;
pub mod sync;
pub mod tracked;
pub mod version_control;

pub use delta::Delta;
pub use diff::{DeltaDiff, DiffLine, DiffLineType, ItemDiff};
pub use document::{document_registry, Document, FieldsDiffLogic, DEFAULT_TYPES};
pub use error::{Error, Result};
pub use head::{Head, HeadRecord};
pub use project::{Project, ProjectRecord};
pub use revision::{Revision, RevisionRecord};
pub use revision_item::{RevisionItem, RevisionItemKind, RevisionItemRecord};
pub use snapshot::{Snapshot, SnapshotRecord};
pub use stash::{StashesRecord, StashesRepository};
pub use storage::Storage;
pub use tracked::{
    AsItemState, Diff, DiffLogic, ItemFactory, ItemRegistry, ItemState, TrackedItem,
    TrackedItemsSource,
};
pub use version_control::{SyncState, VersionControl, VersionControlRecord};
