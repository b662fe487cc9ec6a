//! Authentication route handlers for login and logout.

use axum::{
    extract::{Form, State},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{verify_password, SESSION_COOKIE};
use crate::db::users;
use crate::i18n::tr;
use crate::state::AppState;
use super::utils::{clear_cookie, get_cookie, resolve_locale, see_other, session_cookie, PageContext};

/// Login form data
#[derive(serde::Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn login_form(state: &AppState, headers: &HeaderMap, username: &str, error: Option<&str>) -> Response {
    let mut page = PageContext::new(state, headers, None);
    let lang = resolve_locale(&state.settings, headers);
    page.insert("title", &tr(&lang, "auth.sign_in", &[]));
    page.insert("username", username);
    if let Some(error) = error {
        page.insert("error", error);
    }
    page.render("login.html")
}

/// Login page (GET)
pub async fn login_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    login_form(&state, &headers, "", None)
}

/// Login submit (POST)
pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match users::get_user_by_name(&state.db, &form.username).await {
        Ok(user) if !user.is_org && user.is_local() && !user.passwd.is_empty() => Some(user),
        Ok(_) | Err(users::UserError::NotExist(_)) => None,
        Err(e) => {
            tracing::error!("Login lookup for {} failed: {}", form.username, e);
            None
        }
    };

    match user {
        Some(user) if verify_password(&form.password, &user.salt, &user.passwd) => {
            let session = state.auth.create_session(user.id);
            tracing::info!("User {} signed in", user.name);
            see_other(&state.settings, "/user/settings", &[session_cookie(&state.settings, &session.token)])
        }
        _ => {
            let lang = resolve_locale(&state.settings, &headers);
            login_form(&state, &headers, &form.username, Some(&tr(&lang, "auth.invalid_credentials", &[])))
        }
    }
}

/// Logout (GET)
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = get_cookie(&headers, SESSION_COOKIE) {
        state.auth.remove_session(&token);
    }
    see_other(&state.settings, "/user/login", &[clear_cookie(&state.settings, SESSION_COOKIE)])
}
