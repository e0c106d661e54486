use crate::delta::Delta;
use crate::error::{Error, Result};
use crate::tracked::{DiffLogic, ItemRegistry, ItemState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Role of a record inside one revision or snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionItemKind {
    Added,
    Removed,
    Changed,
    #[default]
    #[serde(other)]
    Undefined,
}

impl RevisionItemKind {
    pub fn as_str(&self) -> &str {
        match self {
            RevisionItemKind::Added => "added",
            RevisionItemKind::Removed => "removed",
            RevisionItemKind::Changed => "changed",
            RevisionItemKind::Undefined => "undefined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(RevisionItemKind::Added),
            "removed" => Some(RevisionItemKind::Removed),
            "changed" => Some(RevisionItemKind::Changed),
            _ => None,
        }
    }
}

impl fmt::Display for RevisionItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable per-item change record.
#[derive(Debug, Clone)]
pub struct RevisionItem {
    uuid: Uuid,
    kind: RevisionItemKind,
    vcs_name: String,
    logic: Arc<dyn DiffLogic>,
    deltas: Vec<Delta>,
}

impl RevisionItem {
    /// Deep-copies the state of `source` into a new record.
    pub fn new(kind: RevisionItemKind, source: &dyn ItemState) -> Self {
        Self {
            uuid: source.uuid(),
            kind,
            vcs_name: source.vcs_name().to_string(),
            logic: source.diff_logic(),
            deltas: source.deltas().to_vec(),
        }
    }

    pub fn kind(&self) -> RevisionItemKind {
        self.kind
    }

    pub fn diff_logic_type(&self) -> &str {
        self.logic.type_tag()
    }

    pub fn to_record(&self) -> RevisionItemRecord {
        RevisionItemRecord {
            uuid: self.uuid,
            kind: self.kind,
            vcs_name: self.vcs_name.clone(),
            diff_logic: self.diff_logic_type().to_string(),
            deltas: self.deltas.clone(),
        }
    }

    pub fn from_record(record: &RevisionItemRecord, registry: &ItemRegistry) -> Result<Self> {
        let logic = registry
            .logic_for(&record.diff_logic)
            .ok_or_else(|| Error::UnknownItemType(record.diff_logic.clone()))?;

        Ok(Self {
            uuid: record.uuid,
            kind: record.kind,
            vcs_name: record.vcs_name.clone(),
            logic,
            deltas: record.deltas.clone(),
        })
    }

    /// Same record, re-labelled. Used when loading a saved snapshot.
    pub fn with_kind(&self, kind: RevisionItemKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }
}

impl ItemState for RevisionItem {
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

impl PartialEq for RevisionItem {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
            && self.kind == other.kind
            && self.vcs_name == other.vcs_name
            && self.diff_logic_type() == other.diff_logic_type()
            && self.deltas == other.deltas
    }
}

/// Serialized form of a [`RevisionItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionItemRecord {
    pub uuid: Uuid,
    #[serde(default)]
    pub kind: RevisionItemKind,
    pub vcs_name: String,
    pub diff_logic: String,
    #[serde(default)]
    pub deltas: Vec<Delta>,
}
