use super::dto::{ProjectDto, ProjectUpdate, RevisionDto};
use super::transport::{SyncTransport, TransportError, TransportResult};
use crate::error::Result;
use crate::storage::Storage;
use parking_lot::Mutex;
use std::path::Path;
use uuid::Uuid;

/// A remote living in a local SQLite file, or in memory for tests.
pub struct StorageTransport {
    storage: Mutex<Storage>,
}

impl StorageTransport {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Storage::new(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Storage::in_memory()?))
    }

    pub fn new(storage: Storage) -> Self {
        Self {
            storage: Mutex::new(storage),
        }
    }
}

fn transport_error(e: crate::Error) -> TransportError {
    TransportError::new(e.to_string())
}

impl SyncTransport for StorageTransport {
    fn fetch_project(&self, project_id: Uuid) -> TransportResult<Option<ProjectDto>> {
        self.storage
            .lock()
            .get_project(&project_id)
            .map_err(transport_error)
    }

    fn put_project(&self, project_id: Uuid, update: &ProjectUpdate) -> TransportResult<()> {
        self.storage
            .lock()
            .upsert_project(&project_id, update)
            .map_err(transport_error)
    }

    fn fetch_revision(&self, project_id: Uuid, revision_id: Uuid) -> TransportResult<RevisionDto> {
        self.storage
            .lock()
            .get_revision(&project_id, &revision_id)
            .map_err(transport_error)
    }

    fn put_revision(&self, project_id: Uuid, revision: &RevisionDto) -> TransportResult<()> {
        self.storage
            .lock()
            .put_revision(&project_id, revision)
            .map_err(transport_error)
    }

    fn delete_project(&self, project_id: Uuid) -> TransportResult<()> {
        let deleted = self
            .storage
            .lock()
            .delete_project(&project_id)
            .map_err(transport_error)?;

        if deleted {
            Ok(())
        } else {
            Err(TransportError::new(format!(
                "Project not found: {}",
                project_id
            )))
        }
    }
}
