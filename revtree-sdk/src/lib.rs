//! # revtree-sdk
//!
//! Blocking HTTP client for a `revtree-server` remote. [`RevtreeClient`]
//! implements [`SyncTransport`], so it plugs straight into the sync workers
//! of `revtree-core`.
//!
//! ## Example
//!
//! ```no_run
//! use revtree_core::sync::{SyncService, SyncTarget};
//! use revtree_core::{document_registry, VersionControl, DEFAULT_TYPES};
//! use revtree_sdk::RevtreeClient;
//! use std::sync::Arc;
//!
//! let client = Arc::new(RevtreeClient::new("http://localhost:3030"));
//! let vcs = Arc::new(VersionControl::new(Arc::new(document_registry(DEFAULT_TYPES))));
//!
//! let (service, mut events) = SyncService::new(client);
//! service.push(SyncTarget::new(vcs, uuid::Uuid::new_v4(), "My song"));
//! let event = events.blocking_recv();
//! ```

use anyhow::Result;
use reqwest::blocking::Response;
use reqwest::StatusCode;
use revtree_core::sync::{
    ProjectDto, ProjectUpdate, RevisionDto, SyncTransport, TransportError, TransportResult,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct RevtreeClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectSummary {
    pub id: Uuid,
    pub title: String,
}

impl RevtreeClient {
    /// Create a new revtree client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the revtree server (e.g., "http://localhost:3030")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check server health
    pub fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()?;

        Ok(response.status().is_success())
    }

    /// Projects stored on the server
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let response = self
            .client
            .get(format!("{}/projects", self.base_url))
            .send()?
            .error_for_status()?;

        Ok(response.json()?)
    }

    fn project_url(&self, project_id: Uuid) -> String {
        format!("{}/projects/{}", self.base_url, project_id)
    }

    fn revision_url(&self, project_id: Uuid, revision_id: Uuid) -> String {
        format!("{}/revisions/{}", self.project_url(project_id), revision_id)
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    TransportError::new(e.to_string())
}

/// Turns a non-success response into the server's error list.
fn check(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let errors = response
        .json::<ErrorBody>()
        .map(|body| body.errors)
        .unwrap_or_default();

    debug!("Remote answered {}: {:?}", status, errors);
    if errors.is_empty() {
        Err(TransportError::new(status.to_string()))
    } else {
        Err(TransportError::from_list(errors))
    }
}

impl SyncTransport for RevtreeClient {
    fn fetch_project(&self, project_id: Uuid) -> TransportResult<Option<ProjectDto>> {
        let response = self
            .client
            .get(self.project_url(project_id))
            .send()
            .map_err(request_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        check(response)?.json().map(Some).map_err(request_error)
    }

    fn put_project(&self, project_id: Uuid, update: &ProjectUpdate) -> TransportResult<()> {
        let response = self
            .client
            .put(self.project_url(project_id))
            .json(update)
            .send()
            .map_err(request_error)?;

        check(response).map(|_| ())
    }

    fn fetch_revision(&self, project_id: Uuid, revision_id: Uuid) -> TransportResult<RevisionDto> {
        let response = self
            .client
            .get(self.revision_url(project_id, revision_id))
            .send()
            .map_err(request_error)?;

        check(response)?.json().map_err(request_error)
    }

    fn put_revision(&self, project_id: Uuid, revision: &RevisionDto) -> TransportResult<()> {
        let response = self
            .client
            .put(self.revision_url(project_id, revision.id))
            .json(revision)
            .send()
            .map_err(request_error)?;

        check(response).map(|_| ())
    }

    fn delete_project(&self, project_id: Uuid) -> TransportResult<()> {
        let response = self
            .client
            .delete(self.project_url(project_id))
            .send()
            .map_err(request_error)?;

        check(response).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtree_core::document::TRACK;
    use revtree_core::sync::{SyncKind, SyncOutcome, SyncService, SyncTarget};
    use revtree_core::{document_registry, Project, VersionControl, DEFAULT_TYPES};
    use revtree_server::RevtreeServer;
    use std::collections::BTreeSet;
    use std::sync::{mpsc, Arc};

    fn spawn_server() -> String {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap()).unwrap();
                RevtreeServer::in_memory()
                    .unwrap()
                    .serve_on(listener)
                    .await
                    .unwrap();
            });
        });
        format!("http://{}", rx.recv().unwrap())
    }

    fn new_vcs() -> Arc<VersionControl> {
        Arc::new(VersionControl::new(Arc::new(document_registry(DEFAULT_TYPES))))
    }

    #[test]
    fn test_client_creation() {
        let client = RevtreeClient::new("http://localhost:3030/");
        assert_eq!(client.base_url(), "http://localhost:3030");
        assert_eq!(
            client.revision_url(Uuid::nil(), Uuid::nil()),
            format!("http://localhost:3030/projects/{0}/revisions/{0}", Uuid::nil())
        );
    }

    #[test]
    fn test_missing_project_is_none_and_errors_carry_server_messages() {
        let client = RevtreeClient::new(spawn_server());
        assert!(client.health_check().unwrap());

        let project_id = Uuid::new_v4();
        assert_eq!(client.fetch_project(project_id).unwrap(), None);

        let error = client.fetch_revision(project_id, Uuid::new_v4()).unwrap_err();
        assert!(error.errors[0].contains("Revision not found"), "{:?}", error);

        let error = client.delete_project(project_id).unwrap_err();
        assert!(error.errors[0].contains("Project not found"), "{:?}", error);
    }

    #[test]
    fn test_push_then_clone_over_http() {
        let client = Arc::new(RevtreeClient::new(spawn_server()));
        let (service, mut events) = SyncService::new(client.clone());

        let source = new_vcs();
        let mut project = Project::new("Song", Arc::clone(source.registry()));
        let bass = project.add_document(TRACK, "Bass", &[]).unwrap();
        source.commit_all(&project, "add bass").unwrap();
        project
            .set_field(bass, "volume", serde_json::json!(0.8))
            .unwrap();
        source.commit_all(&project, "louder").unwrap();

        assert!(service.push(SyncTarget::new(Arc::clone(&source), project.id(), "Song")));
        let event = events.blocking_recv().unwrap();
        assert_eq!(event.kind, SyncKind::Push);
        assert_eq!(event.outcome, SyncOutcome::PushDone { pushed: 3 });

        let listed = client.list_projects().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Song");

        let copy = new_vcs();
        assert!(service.clone_project(SyncTarget::new(Arc::clone(&copy), project.id(), "Song")));
        let event = events.blocking_recv().unwrap();
        assert_eq!(event.outcome, SyncOutcome::CloneDone);

        let ids = |vcs: &VersionControl| -> BTreeSet<Uuid> {
            vcs.revisions().iter().map(|r| r.id()).collect()
        };
        assert_eq!(ids(&copy), ids(&source));
        assert_eq!(copy.heading_revision().id(), source.heading_revision().id());
        assert!(copy.revisions().iter().all(|r| !r.is_shallow()));
    }
}
