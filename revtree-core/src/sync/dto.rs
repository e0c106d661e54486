use crate::revision::Revision;
use crate::revision_item::RevisionItemRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Full payload of one revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionPayload {
    #[serde(default)]
    pub items: Vec<RevisionItemRecord>,
}

impl RevisionPayload {
    pub fn from_revision(revision: &Revision) -> Self {
        Self {
            items: revision.items_to_records(),
        }
    }

    /// SHA-256 over the payload JSON, hex encoded.
    pub fn hash(&self) -> String {
        // serializing plain records into memory cannot fail
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// Revision as exchanged with a remote. Listings carry summaries only
/// (`data` is `None`); single-revision fetches and pushes carry the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionDto {
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub message: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RevisionPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_hash: Option<String>,
}

impl RevisionDto {
    pub fn from_revision(revision: &Revision) -> Self {
        let payload = RevisionPayload::from_revision(revision);
        Self {
            id: revision.id(),
            parent_id: revision.parent().map(|p| p.id()),
            message: revision.message().to_string(),
            timestamp: revision.timestamp(),
            data_hash: Some(payload.hash()),
            data: Some(payload),
        }
    }

    /// The same revision without its payload.
    pub fn summary(&self) -> Self {
        Self {
            data: None,
            ..self.clone()
        }
    }

    /// The payload, provided it is present and matches its hash.
    pub fn verified_payload(&self) -> Result<&RevisionPayload, String> {
        let payload = self
            .data
            .as_ref()
            .ok_or_else(|| format!("revision {} has no payload", self.id))?;

        match &self.data_hash {
            Some(expected) if *expected != payload.hash() => Err(format!(
                "revision {} payload hash mismatch",
                self.id
            )),
            _ => Ok(payload),
        }
    }
}

/// A project as listed by a remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDto {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub head: Option<Uuid>,
    #[serde(default)]
    pub revisions: Vec<RevisionDto>,
}

/// Create-or-update body for a remote project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub title: String,
    #[serde(default)]
    pub head: Option<Uuid>,
}
