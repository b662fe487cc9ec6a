//! Web UI Module
//!
//! Settings pages of the signed-in user and raw/media downloads of
//! repository files.

mod routes;
mod templates;

use axum::{http::StatusCode, response::Response, Router};
use std::sync::Arc;

use crate::state::AppState;

/// Create the web UI router.
pub fn router() -> Router<Arc<AppState>> {
    routes::create_router()
}

/// HTML error page with the given status
pub fn error_page(status: StatusCode, message: &str) -> Response {
    routes::utils::render_error(status, message)
}
