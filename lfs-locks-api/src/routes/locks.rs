use crate::auth::CurrentUser;
use crate::error::{AppError, LfsJson};
use crate::models::lock::{CreateLockRequest, LockFilter, UnlockRequest};
use crate::services::locks;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const LOCKS_PATH: &str = "/{namespace}/{repository}/info/lfs/locks";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(LOCKS_PATH, get(list_locks).post(create_lock))
        .route(&format!("{LOCKS_PATH}/verify"), post(verify_locks))
        .route(&format!("{LOCKS_PATH}/{{id}}/unlock"), post(unlock))
}

#[derive(Debug, Deserialize)]
struct ProjectPath {
    namespace: String,
    repository: String,
}

#[derive(Debug, Deserialize)]
struct LockPath {
    namespace: String,
    repository: String,
    id: String,
}

/// `group/project` for a `group/project.git` route.
fn project_key(namespace: &str, repository: &str) -> Result<String, AppError> {
    repository
        .strip_suffix(".git")
        .filter(|name| !name.is_empty())
        .map(|name| format!("{}/{}", namespace, name))
        .ok_or_else(|| AppError::NotFound("Repository not found".into()))
}

async fn create_lock(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<ProjectPath>,
    Json(body): Json<CreateLockRequest>,
) -> Result<LfsJson<serde_json::Value>, AppError> {
    let project = project_key(&path.namespace, &path.repository)?;
    let db = state.db.clone();
    let lock = tokio::task::spawn_blocking(move || {
        let conn = db.get().map_err(|e| anyhow::anyhow!(e))?;
        locks::lock_file(&conn, &project, &body.path, &user.name)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;
    Ok(LfsJson(StatusCode::CREATED, json!({ "lock": lock })))
}

async fn unlock(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<LockPath>,
    body: Option<Json<UnlockRequest>>,
) -> Result<LfsJson<serde_json::Value>, AppError> {
    let project = project_key(&path.namespace, &path.repository)?;
    let force = body.map(|Json(b)| b.force).unwrap_or(false);
    let db = state.db.clone();
    let lock = tokio::task::spawn_blocking(move || {
        let conn = db.get().map_err(|e| anyhow::anyhow!(e))?;
        locks::unlock_file(&conn, &project, &path.id, &user.name, force)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;
    Ok(LfsJson(StatusCode::OK, json!({ "lock": lock })))
}

async fn list_locks(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(path): Path<ProjectPath>,
    Query(filter): Query<LockFilter>,
) -> Result<LfsJson<serde_json::Value>, AppError> {
    let project = project_key(&path.namespace, &path.repository)?;
    let db = state.db.clone();
    let found = tokio::task::spawn_blocking(move || {
        let conn = db.get().map_err(|e| anyhow::anyhow!(e))?;
        locks::find_locks(&conn, &project, &filter)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;
    Ok(LfsJson(StatusCode::OK, json!({ "locks": found })))
}

async fn verify_locks(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(path): Path<ProjectPath>,
) -> Result<LfsJson<serde_json::Value>, AppError> {
    let project = project_key(&path.namespace, &path.repository)?;
    let db = state.db.clone();
    let (ours, theirs) = tokio::task::spawn_blocking(move || {
        let conn = db.get().map_err(|e| anyhow::anyhow!(e))?;
        let all = locks::find_locks(&conn, &project, &LockFilter::default())?;
        Ok::<_, AppError>(locks::split_by_owner(all, &user.name))
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;
    Ok(LfsJson(StatusCode::OK, json!({ "ours": ours, "theirs": theirs })))
}
