use crate::api::{create_router, AppState};
use axum::Router;
use parking_lot::Mutex;
use revtree_core::Storage;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct RevtreeServer {
    storage: Arc<Mutex<Storage>>,
    db_path: Option<PathBuf>,
}

impl RevtreeServer {
    pub fn new(db_path: PathBuf) -> anyhow::Result<Self> {
        let storage = Storage::new(&db_path)?;

        Ok(Self {
            storage: Arc::new(Mutex::new(storage)),
            db_path: Some(db_path),
        })
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            storage: Arc::new(Mutex::new(Storage::in_memory()?)),
            db_path: None,
        })
    }

    pub fn router(&self) -> Router {
        create_router(AppState {
            storage: Arc::clone(&self.storage),
        })
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    pub async fn serve_on(self, listener: TcpListener) -> anyhow::Result<()> {
        let app = self.router();

        info!("Server listening on {}", listener.local_addr()?);
        match &self.db_path {
            Some(path) => info!("Database: {:?}", path),
            None => info!("Database: in memory"),
        }

        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtree_core::sync::{ProjectDto, ProjectUpdate, RevisionDto, RevisionPayload};
    use reqwest::StatusCode;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn spawn(server: RevtreeServer) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve_on(listener));
        format!("http://{}", addr)
    }

    fn revision(parent_id: Option<Uuid>, message: &str) -> RevisionDto {
        let payload = RevisionPayload::default();
        RevisionDto {
            id: Uuid::new_v4(),
            parent_id,
            message: message.to_string(),
            timestamp: 1,
            data_hash: Some(payload.hash()),
            data: Some(payload),
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let db_dir = TempDir::new().unwrap();
        let server = RevtreeServer::new(db_dir.path().join("remote.db"));

        assert!(server.is_ok());
    }

    #[tokio::test]
    async fn test_project_and_revision_endpoints() {
        let base = spawn(RevtreeServer::in_memory().unwrap()).await;
        let client = reqwest::Client::new();
        let project_id = Uuid::new_v4();

        let health = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let missing = client
            .get(format!("{}/projects/{}", base, project_id))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = missing.json().await.unwrap();
        assert!(body["errors"][0].as_str().unwrap().contains("not found"));

        let update = ProjectUpdate {
            title: "Song".to_string(),
            head: None,
        };
        let created = client
            .put(format!("{}/projects/{}", base, project_id))
            .json(&update)
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::NO_CONTENT);

        let root = revision(None, "initial revision");
        let stored = client
            .put(format!("{}/projects/{}/revisions/{}", base, project_id, root.id))
            .json(&root)
            .send()
            .await
            .unwrap();
        assert_eq!(stored.status(), StatusCode::NO_CONTENT);

        let orphan = revision(Some(Uuid::new_v4()), "orphan");
        let rejected = client
            .put(format!("{}/projects/{}/revisions/{}", base, project_id, orphan.id))
            .json(&orphan)
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let project: ProjectDto = client
            .get(format!("{}/projects/{}", base, project_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(project.title, "Song");
        assert_eq!(project.revisions.len(), 1);
        assert!(project.revisions[0].data.is_none());

        let fetched: RevisionDto = client
            .get(format!("{}/projects/{}/revisions/{}", base, project_id, root.id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(fetched, root);

        let deleted = client
            .delete(format!("{}/projects/{}", base, project_id))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_mismatched_revision_id_is_rejected() {
        let base = spawn(RevtreeServer::in_memory().unwrap()).await;
        let client = reqwest::Client::new();

        let root = revision(None, "initial revision");
        let response = client
            .put(format!("{}/projects/{}/revisions/{}", base, Uuid::new_v4(), Uuid::new_v4()))
            .json(&root)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bad_id = client
            .get(format!("{}/projects/not-a-uuid", base))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
    }
}
