pub mod locks;

use crate::error::attach_documentation_url;
use crate::state::AppState;
use axum::middleware::map_response_with_state;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(locks::router())
        .layer(map_response_with_state(state.clone(), attach_documentation_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
