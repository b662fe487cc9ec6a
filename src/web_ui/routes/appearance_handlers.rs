//! Appearance settings: theme, language and hidden comment types.

use axum::{
    extract::{Form, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::users::{self, SETTINGS_KEY_HIDDEN_COMMENT_TYPES};
use crate::error::ServerError;
use crate::i18n::tr;
use crate::state::AppState;
use super::utils::{
    invalid_csrf, is_checked, locale_cookie, redirect_with_flash, require_user, resolve_locale, see_other,
    Flash, PageContext,
};

const APPEARANCE_PATH: &str = "/user/settings/appearance";

/// Comment type groups a user can hide, with the comment type numbers in each
pub const COMMENT_TYPE_GROUPS: &[(&str, &[u32])] = &[
    ("reference", &[3, 4, 5, 6]),
    ("label", &[7]),
    ("milestone", &[8]),
    ("assignee", &[9]),
    ("title", &[10]),
    ("branch", &[11, 25]),
    ("time_tracking", &[12, 13, 14, 15, 26]),
    ("deadline", &[16, 17, 18]),
    ("dependency", &[19, 20]),
    ("lock", &[23, 24]),
    ("review_request", &[27]),
    ("pull_request_push", &[29]),
    ("project", &[30, 31]),
    ("issue_ref", &[33]),
];

/// Parse the stored bitmask; anything unparsable hides nothing
pub fn parse_hidden_comment_types(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

/// A group counts as checked when any of its comment types is hidden
pub fn is_group_checked(group: &str, hidden: Option<u64>) -> bool {
    let Some(hidden) = hidden else {
        return false;
    };
    COMMENT_TYPE_GROUPS
        .iter()
        .find(|(name, _)| *name == group)
        .is_some_and(|(_, types)| types.iter().any(|t| hidden & (1u64 << t) != 0))
}

/// Bitmask of every comment type in the checked groups
pub fn hidden_comment_types_from_form(form: &HashMap<String, String>) -> u64 {
    COMMENT_TYPE_GROUPS
        .iter()
        .filter(|(name, _)| is_checked(form.get(*name).map(String::as_str)))
        .flat_map(|(_, types)| types.iter())
        .fold(0u64, |mask, t| mask | (1u64 << t))
}

#[derive(Serialize)]
struct CommentGroupView {
    name: &'static str,
    label: String,
    checked: bool,
}

#[derive(Serialize)]
struct LanguageView {
    code: String,
    name: String,
}

/// Appearance page (GET /user/settings/appearance)
pub async fn appearance_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let current = match require_user(&state, &headers).await {
        Ok(current) => current,
        Err(redirect) => return redirect,
    };
    let value = match users::get_user_setting(&state.db, current.user.id, SETTINGS_KEY_HIDDEN_COMMENT_TYPES).await {
        Ok(value) => value,
        Err(e) => return ServerError::from(e).into_response(),
    };
    let hidden = parse_hidden_comment_types(&value);

    let lang = resolve_locale(&state.settings, &headers);
    let groups: Vec<CommentGroupView> = COMMENT_TYPE_GROUPS
        .iter()
        .map(|(name, _)| CommentGroupView {
            name: *name,
            label: tr(&lang, &format!("comment.{}", name), &[]),
            checked: is_group_checked(name, hidden),
        })
        .collect();

    let i18n = &state.settings.i18n;
    let languages: Vec<LanguageView> = i18n
        .langs
        .iter()
        .enumerate()
        .map(|(i, code)| LanguageView {
            code: code.clone(),
            name: i18n.names.get(i).cloned().unwrap_or_else(|| code.clone()),
        })
        .collect();

    let theme = if current.user.theme.is_empty() {
        state.settings.ui.default_theme.clone()
    } else {
        current.user.theme.clone()
    };

    let mut page = PageContext::new(&state, &headers, Some(&current));
    page.insert("page_is_settings_appearance", &true);
    page.insert("comment_groups", &groups);
    page.insert("themes", &state.settings.ui.themes);
    page.insert("current_theme", &theme);
    page.insert("languages", &languages);
    page.insert("current_language", &current.user.language);
    page.render("user/settings/appearance.html")
}

#[derive(Debug, Deserialize)]
pub struct ThemeForm {
    #[serde(default)]
    pub theme: String,
    #[serde(default, rename = "_csrf")]
    pub csrf: String,
}

/// Update theme (POST /user/settings/appearance/theme)
pub async fn update_theme_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<ThemeForm>, axum::extract::rejection::FormRejection>,
) -> Response {
    let current = match require_user(&state, &headers).await {
        Ok(current) => current,
        Err(redirect) => return redirect,
    };
    let Ok(Form(form)) = form else {
        return see_other(&state.settings, APPEARANCE_PATH, &[]);
    };
    let lang = resolve_locale(&state.settings, &headers);
    if !current.check_csrf(&form.csrf) {
        return invalid_csrf(&lang);
    }

    let error = || Flash::error(tr(&lang, "settings.theme_update_error", &[]));
    if !state.settings.ui.themes.iter().any(|t| t == &form.theme) {
        return redirect_with_flash(&state.settings, APPEARANCE_PATH, error());
    }
    if let Err(e) = users::update_user_theme(&state.db, current.user.id, &form.theme).await {
        tracing::error!("UpdateUserTheme for {}: {}", current.user.name, e);
        return redirect_with_flash(&state.settings, APPEARANCE_PATH, error());
    }

    tracing::trace!("Update user theme: {}", current.user.name);
    redirect_with_flash(
        &state.settings,
        APPEARANCE_PATH,
        Flash::success(tr(&lang, "settings.theme_update_success", &[])),
    )
}

#[derive(Debug, Deserialize)]
pub struct LanguageForm {
    #[serde(default)]
    pub language: String,
    #[serde(default, rename = "_csrf")]
    pub csrf: String,
}

/// Update language (POST /user/settings/appearance/language)
pub async fn update_language_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LanguageForm>,
) -> Response {
    let current = match require_user(&state, &headers).await {
        Ok(current) => current,
        Err(redirect) => return redirect,
    };
    let lang = resolve_locale(&state.settings, &headers);
    if !current.check_csrf(&form.csrf) {
        return invalid_csrf(&lang);
    }

    let mut u = current.user.clone();
    if !form.language.is_empty() {
        if !state.settings.i18n.langs.contains(&form.language) {
            return redirect_with_flash(
                &state.settings,
                APPEARANCE_PATH,
                Flash::error(tr(&lang, "settings.update_language_not_found", &[&form.language])),
            );
        }
        u.language = form.language;
    }

    let u = match users::update_user_setting(&state.db, &state.settings, &u).await {
        Ok(u) => u,
        Err(e) => return ServerError::from(e).into_response(),
    };

    tracing::trace!("User settings updated: {}", u.name);
    let flash = Flash::success(tr(&u.language, "settings.update_language_success", &[]));
    see_other(
        &state.settings,
        APPEARANCE_PATH,
        &[locale_cookie(&state.settings, &u.language), flash.to_cookie(&state.settings)],
    )
}

/// Update hidden comment types (POST /user/settings/appearance/hidden_comments)
pub async fn update_hidden_comments_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let current = match require_user(&state, &headers).await {
        Ok(current) => current,
        Err(redirect) => return redirect,
    };
    let lang = resolve_locale(&state.settings, &headers);
    if !current.check_csrf(form.get("_csrf").map_or("", String::as_str)) {
        return invalid_csrf(&lang);
    }

    let mask = hidden_comment_types_from_form(&form);
    if let Err(e) = users::set_user_setting(
        &state.db,
        current.user.id,
        SETTINGS_KEY_HIDDEN_COMMENT_TYPES,
        &mask.to_string(),
    )
    .await
    {
        return ServerError::from(e).into_response();
    }

    tracing::trace!("User settings updated: {}", current.user.name);
    redirect_with_flash(
        &state.settings,
        APPEARANCE_PATH,
        Flash::success(tr(&lang, "settings.saved_successfully", &[])),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{create_user, get_user_by_id, get_user_setting, NewUser};
    use crate::state::tests::test_state;
    use crate::web_ui::routes::test_support::{body_string, location, post_form, send_get, signed_in};
    use axum::http::StatusCode;
    use tempfile::TempDir;

    fn flash_cookie(resp: &Response) -> String {
        resp.headers()
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|c| c.starts_with("flash="))
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_hidden_comment_bitmask() {
        let mut form = HashMap::new();
        form.insert("label".to_string(), "on".to_string());
        form.insert("branch".to_string(), "true".to_string());
        form.insert("lock".to_string(), "off".to_string());
        let mask = hidden_comment_types_from_form(&form);
        assert_eq!(mask, (1 << 7) | (1 << 11) | (1 << 25));

        assert!(is_group_checked("label", Some(mask)));
        assert!(is_group_checked("branch", Some(1 << 25)));
        assert!(!is_group_checked("lock", Some(mask)));
        assert!(!is_group_checked("label", parse_hidden_comment_types("garbage")));
        assert!(!is_group_checked("unknown", Some(u64::MAX)));
        assert_eq!(parse_hidden_comment_types(" 128 "), Some(128));
    }

    #[tokio::test]
    async fn test_hidden_comments_round_trip_through_page() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path()).await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let (cookie, csrf) = signed_in(&state, &alice);

        let body = format!("_csrf={}&milestone=on&issue_ref=1", csrf);
        let resp = post_form(&state, "/user/settings/appearance/hidden_comments", &cookie, &body).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), APPEARANCE_PATH);
        let stored = get_user_setting(&state.db, alice.id, SETTINGS_KEY_HIDDEN_COMMENT_TYPES)
            .await
            .unwrap();
        assert_eq!(stored, ((1u64 << 8) | (1u64 << 33)).to_string());

        let html = body_string(send_get(&state, APPEARANCE_PATH, Some(&cookie)).await).await;
        assert!(html.contains("name=\"milestone\" checked"));
        assert!(html.contains("name=\"issue_ref\" checked"));
        assert!(!html.contains("name=\"label\" checked"));
    }

    #[tokio::test]
    async fn test_theme_update() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path()).await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let (cookie, csrf) = signed_in(&state, &alice);

        let resp = post_form(&state, "/user/settings/appearance/theme", &cookie, &format!("_csrf={}&theme=arc-green", csrf)).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(flash_cookie(&resp).contains("success"));
        assert_eq!(get_user_by_id(&state.db, alice.id).await.unwrap().theme, "arc-green");

        let resp = post_form(&state, "/user/settings/appearance/theme", &cookie, &format!("_csrf={}&theme=neon", csrf)).await;
        assert!(flash_cookie(&resp).contains("error"));
        assert_eq!(get_user_by_id(&state.db, alice.id).await.unwrap().theme, "arc-green");
    }

    #[tokio::test]
    async fn test_language_update() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path()).await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let (cookie, csrf) = signed_in(&state, &alice);

        let resp = post_form(&state, "/user/settings/appearance/language", &cookie, &format!("_csrf={}&language=xx-XX", csrf)).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(flash_cookie(&resp).contains("error"));
        assert_eq!(get_user_by_id(&state.db, alice.id).await.unwrap().language, "");

        let resp = post_form(&state, "/user/settings/appearance/language", &cookie, &format!("_csrf={}&language=de-DE", csrf)).await;
        let cookies: Vec<String> = resp
            .headers()
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert!(cookies.iter().any(|c| c.starts_with("lang=de-DE")));
        let flash: Flash = serde_urlencoded::from_str(
            flash_cookie(&resp).trim_start_matches("flash=").split(';').next().unwrap(),
        )
        .unwrap();
        assert_eq!(flash.message, "Sprache wurde aktualisiert.");
        assert_eq!(get_user_by_id(&state.db, alice.id).await.unwrap().language, "de-DE");
    }
}
