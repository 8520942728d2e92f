//! HTTP endpoints.

mod mattermost;

use axum::Router;

use crate::middleware::AppState;

/// Create the router.
pub fn router() -> Router<AppState> {
    Router::new().nest("/hooks/mattermost", mattermost::router())
}
