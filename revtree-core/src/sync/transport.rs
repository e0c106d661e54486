use super::dto::{ProjectDto, ProjectUpdate, RevisionDto};
use thiserror::Error;
use uuid::Uuid;

/// A failed remote call, as an ordered list of human-readable messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .errors.join("; "))]
pub struct TransportError {
    pub errors: Vec<String>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }

    pub fn from_list(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            return Self::new("unknown error");
        }
        Self { errors }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// What a sync worker needs from a remote.
///
/// Calls block the worker thread; implementations must be shareable between
/// workers.
pub trait SyncTransport: Send + Sync {
    /// `Ok(None)` when the remote has no such project.
    fn fetch_project(&self, project_id: Uuid) -> TransportResult<Option<ProjectDto>>;

    fn put_project(&self, project_id: Uuid, update: &ProjectUpdate) -> TransportResult<()>;

    fn fetch_revision(&self, project_id: Uuid, revision_id: Uuid) -> TransportResult<RevisionDto>;

    fn put_revision(&self, project_id: Uuid, revision: &RevisionDto) -> TransportResult<()>;

    fn delete_project(&self, project_id: Uuid) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_joins_messages() {
        let error = TransportError::from_list(vec!["404".to_string(), "gone".to_string()]);
        assert_eq!(error.to_string(), "404; gone");
        assert_eq!(TransportError::from_list(Vec::new()).errors, vec!["unknown error"]);
    }
}
