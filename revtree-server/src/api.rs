use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use parking_lot::Mutex;
use revtree_core::sync::{ProjectDto, ProjectUpdate, RevisionDto};
use revtree_core::{Error, Storage};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Mutex<Storage>>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/projects", get(list_projects))
        .route(
            "/projects/:id",
            get(get_project).put(put_project).delete(delete_project),
        )
        .route(
            "/projects/:id/revisions/:revision_id",
            get(get_revision).put(put_revision),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error body shared by every endpoint: `{"errors": [...]}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    errors: Vec<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            errors: vec![message.into()],
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::ProjectNotFound(_) | Error::RevisionNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidOperation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!("Request failed: {}", e);
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid UUID: {}", raw)))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Serialize)]
struct ProjectSummary {
    id: Uuid,
    title: String,
}

async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<ProjectSummary>>> {
    let projects = state.storage.lock().list_projects()?;
    Ok(Json(
        projects
            .into_iter()
            .map(|(id, title)| ProjectSummary { id, title })
            .collect(),
    ))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectDto>> {
    let id = parse_id(&id)?;
    state
        .storage
        .lock()
        .get_project(&id)?
        .map(Json)
        .ok_or_else(|| Error::ProjectNotFound(id.to_string()).into())
}

async fn put_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ProjectUpdate>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state.storage.lock().upsert_project(&id, &update)?;
    debug!("Project {} updated, head {:?}", id, update.head);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    if state.storage.lock().delete_project(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::ProjectNotFound(id.to_string()).into())
    }
}

async fn get_revision(
    State(state): State<AppState>,
    Path((id, revision_id)): Path<(String, String)>,
) -> ApiResult<Json<RevisionDto>> {
    let id = parse_id(&id)?;
    let revision_id = parse_id(&revision_id)?;
    let revision = state.storage.lock().get_revision(&id, &revision_id)?;
    Ok(Json(revision))
}

async fn put_revision(
    State(state): State<AppState>,
    Path((id, revision_id)): Path<(String, String)>,
    Json(revision): Json<RevisionDto>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    let revision_id = parse_id(&revision_id)?;

    if revision.id != revision_id {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Revision id {} does not match path {}", revision.id, revision_id),
        ));
    }

    state.storage.lock().put_revision(&id, &revision)?;
    debug!("Revision {} stored in project {}", revision_id, id);
    Ok(StatusCode::NO_CONTENT)
}
