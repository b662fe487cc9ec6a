//! Web UI route table.

pub mod appearance_handlers;
pub mod auth_handlers;
pub mod avatar_handlers;
pub mod download_handlers;
pub mod org_handlers;
pub mod profile_handlers;
pub mod repo_handlers;
pub mod utils;

use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::state::AppState;

/// Create the web UI router
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        // Session
        .route("/user/login", get(auth_handlers::login_page).post(auth_handlers::login_submit))
        .route("/user/logout", get(auth_handlers::logout))
        // Settings
        .route(
            "/user/settings",
            get(profile_handlers::settings_page).post(profile_handlers::profile_post),
        )
        .route("/user/settings/avatar", post(avatar_handlers::avatar_post))
        .route("/user/settings/avatar/delete", post(avatar_handlers::delete_avatar_post))
        .route("/user/settings/organization", get(org_handlers::organization_page))
        .route("/user/settings/repos", get(repo_handlers::repos_page))
        .route("/user/settings/appearance", get(appearance_handlers::appearance_page))
        .route(
            "/user/settings/appearance/theme",
            post(appearance_handlers::update_theme_post),
        )
        .route(
            "/user/settings/appearance/language",
            post(appearance_handlers::update_language_post),
        )
        .route(
            "/user/settings/appearance/hidden_comments",
            post(appearance_handlers::update_hidden_comments_post),
        )
        .route("/avatars/:hash", get(avatar_handlers::serve_avatar))
        // Downloads; `blob` as the kind selects download by blob id
        .route("/:owner/:repo/raw/:kind/*rest", get(download_handlers::raw))
        .route("/:owner/:repo/media/:kind/*rest", get(download_handlers::media))
}

/// Home page: straight to the settings of the signed-in user
async fn index(State(state): State<Arc<AppState>>) -> Response {
    utils::see_other(&state.settings, "/user/settings", &[])
}
