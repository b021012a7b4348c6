use crate::models::lock::Lock;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";

/// JSON body served with the Git LFS media type.
pub struct LfsJson<T>(pub StatusCode, pub T);

impl<T: Serialize> IntoResponse for LfsJson<T> {
    fn into_response(self) -> Response {
        (self.0, [(header::CONTENT_TYPE, LFS_CONTENT_TYPE)], Json(self.1)).into_response()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Conflict { lock: Box<Lock>, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Error body awaiting the documentation link, see [`attach_documentation_url`].
#[derive(Clone)]
struct ErrorPayload(Map<String, Value>);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut payload = Map::new();
        let (status, message) = match self {
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::BadRequest(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            AppError::Conflict { lock, message } => {
                if let Ok(lock) = serde_json::to_value(&*lock) {
                    payload.insert("lock".into(), lock);
                }
                (StatusCode::CONFLICT, message)
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };
        payload.insert("message".into(), Value::String(message));

        let mut response = LfsJson(status, Value::Object(payload.clone())).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer realm=\"Git LFS\""),
            );
        }
        response.extensions_mut().insert(ErrorPayload(payload));
        response
    }
}

/// Add the configured `documentation_url` to every error body.
pub async fn attach_documentation_url(
    State(state): State<Arc<AppState>>,
    mut response: Response,
) -> Response {
    let Some(ErrorPayload(mut payload)) = response.extensions_mut().remove::<ErrorPayload>() else {
        return response;
    };
    payload.insert(
        "documentation_url".into(),
        Value::String(state.config.documentation_url.clone()),
    );

    let (mut parts, _) = response.into_parts();
    let body = LfsJson(parts.status, Value::Object(payload)).into_response();
    parts.headers.remove(header::CONTENT_LENGTH);
    let (body_parts, body) = body.into_parts();
    parts.headers.extend(body_parts.headers);
    Response::from_parts(parts, body)
}
