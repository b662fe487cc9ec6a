//! Shared utilities and helper functions for web UI.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use tera::Context;

use crate::auth::{Session, SESSION_COOKIE};
use crate::config::Settings;
use crate::db::entities::user;
use crate::db::users;
use crate::i18n::{self, DEFAULT_LANG};
use crate::state::AppState;
use crate::web_ui::templates;

pub const FLASH_COOKIE: &str = "flash";
pub const LANG_COOKIE: &str = "lang";

/// Helper to render a template
pub fn render_template(name: &str, context: &Context) -> Response {
    match templates::render(name, context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Template error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Helper to render an error page
pub fn render_error(status: StatusCode, message: &str) -> Response {
    let mut context = Context::new();
    context.insert("message", message);
    context.insert("status", &status.as_u16());
    context.insert("lang", DEFAULT_LANG);
    context.insert("app_sub_url", "");

    match templates::render("error.html", &context) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(_) => (status, message.to_string()).into_response(),
    }
}

/// Value of cookie `name` from the request
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|part| part.trim().strip_prefix(prefix.as_str()).map(str::to_string))
}

fn cookie_path(settings: &Settings) -> String {
    let sub = settings.server.app_sub_url.trim_end_matches('/');
    if sub.is_empty() {
        "/".to_string()
    } else {
        sub.to_string()
    }
}

pub fn session_cookie(settings: &Settings, token: &str) -> String {
    format!(
        "{}={}; Path={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        token,
        cookie_path(settings)
    )
}

pub fn clear_cookie(settings: &Settings, name: &str) -> String {
    format!(
        "{}=; Path={}; HttpOnly; SameSite=Lax; Max-Age=0",
        name,
        cookie_path(settings)
    )
}

/// Session cookie remembering the UI language
pub fn locale_cookie(settings: &Settings, lang: &str) -> String {
    format!("{}={}; Path={}; SameSite=Lax", LANG_COOKIE, lang, cookie_path(settings))
}

/// `lang` cookie, then `Accept-Language`, then the default language
pub fn resolve_locale(settings: &Settings, headers: &HeaderMap) -> String {
    let langs = &settings.i18n.langs;
    if let Some(lang) = get_cookie(headers, LANG_COOKIE) {
        if langs.contains(&lang) {
            return lang;
        }
    }
    headers
        .get(axum::http::header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| i18n::match_accept_language(v, langs))
        .unwrap_or_else(|| DEFAULT_LANG.to_string())
}

/// 303 redirect to an in-app path, setting the given cookies
pub fn see_other(settings: &Settings, path: &str, cookies: &[String]) -> Response {
    let mut resp = Redirect::to(&settings.app_url(path)).into_response();
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            resp.headers_mut().append(SET_COOKIE, value);
        }
    }
    resp
}

/// The signed-in user behind the request's session cookie
pub struct CurrentUser {
    pub user: user::Model,
    pub session: Session,
}

impl CurrentUser {
    pub fn check_csrf(&self, token: &str) -> bool {
        !token.is_empty() && token == self.session.csrf_token
    }
}

/// Extract current user from cookie token
pub async fn get_current_user(state: &AppState, headers: &HeaderMap) -> Option<CurrentUser> {
    let token = get_cookie(headers, SESSION_COOKIE)?;
    let session = state.auth.get_session(&token)?;
    match users::get_user_by_id(&state.db, session.user_id).await {
        Ok(user) => Some(CurrentUser { user, session }),
        Err(e) => {
            tracing::warn!("Session {} refers to a missing user: {}", session.user_id, e);
            None
        }
    }
}

/// Signed-in user, or a redirect to the login page
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser, Response> {
    match get_current_user(state, headers).await {
        Some(current) => Ok(current),
        None => Err(see_other(&state.settings, "/user/login", &[])),
    }
}

pub fn invalid_csrf(lang: &str) -> Response {
    render_error(StatusCode::BAD_REQUEST, &i18n::tr(lang, "form.invalid_csrf", &[]))
}

/// One-shot message shown on the next rendered page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: String,
    pub message: String,
}

impl Flash {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn to_cookie(&self, settings: &Settings) -> String {
        let value = serde_urlencoded::to_string(self).unwrap_or_default();
        format!("{}={}; Path={}; HttpOnly; SameSite=Lax", FLASH_COOKIE, value, cookie_path(settings))
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = get_cookie(headers, FLASH_COOKIE)?;
        serde_urlencoded::from_str(&value).ok()
    }
}

/// `page` query parameter; missing, malformed or non-positive values select page 1
pub fn page_param(query: &std::collections::HashMap<String, String>) -> u64 {
    query
        .get("page")
        .and_then(|p| p.trim().parse::<i64>().ok())
        .filter(|p| *p > 0)
        .map_or(1, |p| p as u64)
}

/// HTML checkbox value
pub fn is_checked(value: Option<&str>) -> bool {
    matches!(value, Some("on" | "true" | "1"))
}

/// Redirect carrying a flash message
pub fn redirect_with_flash(settings: &Settings, path: &str, flash: Flash) -> Response {
    see_other(settings, path, &[flash.to_cookie(settings)])
}

/// Template context with the values every page needs
pub struct PageContext {
    pub context: Context,
    clear_flash: Option<String>,
}

impl PageContext {
    pub fn new(state: &AppState, headers: &HeaderMap, current: Option<&CurrentUser>) -> Self {
        let settings = &state.settings;
        let lang = resolve_locale(settings, headers);
        let mut context = Context::new();
        context.insert("lang", &lang);
        context.insert("app_sub_url", settings.server.app_sub_url.trim_end_matches('/'));
        context.insert("title", &i18n::tr(&lang, "settings", &[]));
        if let Some(current) = current {
            context.insert("current_user", &current.user.name);
            context.insert("is_admin", &current.user.is_admin);
            context.insert("csrf_token", &current.session.csrf_token);
        }

        let mut clear_flash = None;
        if let Some(flash) = Flash::from_headers(headers) {
            context.insert("flash", &flash);
            clear_flash = Some(clear_cookie(settings, FLASH_COOKIE));
        }

        Self { context, clear_flash }
    }

    pub fn insert<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        self.context.insert(key, value);
    }

    pub fn render(self, name: &str) -> Response {
        let mut resp = render_template(name, &self.context);
        if let Some(cookie) = self.clear_flash {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                resp.headers_mut().append(SET_COOKIE, value);
            }
        }
        resp
    }
}

/// Page links for list views
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page_size: u64,
    pub current: u64,
    pub total_pages: u64,
    /// At most `links` page numbers around the current page
    pub pages: Vec<u64>,
    pub previous: Option<u64>,
    pub next: Option<u64>,
}

impl Pagination {
    pub fn new(total: u64, page_size: u64, current: u64, links: u64) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total.div_ceil(page_size).max(1);
        let current = current.clamp(1, total_pages);
        let links = links.max(1);

        let (first, last) = if total_pages <= links {
            (1, total_pages)
        } else {
            let first = current.saturating_sub(links / 2).max(1);
            let first = first.min(total_pages - links + 1);
            (first, first + links - 1)
        };

        Self {
            total,
            page_size,
            current,
            total_pages,
            pages: (first..=last).collect(),
            previous: (current > 1).then(|| current - 1),
            next: (current < total_pages).then(|| current + 1),
        }
    }
}

/// Format a file size for display
pub fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{} B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1} MB", size as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", size as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format seconds ago as human-readable string
pub fn format_time_ago(seconds: i64) -> String {
    if seconds < 0 {
        return "in the future".to_string();
    }
    if seconds < 60 {
        return format!("{} seconds ago", seconds);
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{} minute{} ago", minutes, if minutes == 1 { "" } else { "s" });
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" });
    }
    let days = hours / 24;
    if days < 30 {
        return format!("{} day{} ago", days, if days == 1 { "" } else { "s" });
    }
    let months = days / 30;
    if months < 12 {
        return format!("{} month{} ago", months, if months == 1 { "" } else { "s" });
    }
    let years = months / 12;
    format!("{} year{} ago", years, if years == 1 { "" } else { "s" })
}

/// Format a Unix timestamp as a relative time string
pub fn format_relative_time(timestamp: i64) -> String {
    format_time_ago(crate::db::now_unix() - timestamp)
}
