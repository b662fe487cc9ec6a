//! Profile settings: public profile fields and username changes.

use axum::{
    extract::{Form, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::entities::user;
use crate::db::users::{self, UserError};
use crate::error::ServerError;
use crate::i18n::tr;
use crate::state::AppState;
use super::avatar_handlers::avatar_link;
use super::utils::{
    invalid_csrf, is_checked, locale_cookie, redirect_with_flash, require_user, see_other, CurrentUser,
    Flash, PageContext,
};

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/?#]+(?:[/?#]\S*)?$").expect("valid regex"));

#[derive(Debug, Default, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    pub keep_email_private: Option<String>,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visibility: String,
    pub keep_activity_private: Option<String>,
    #[serde(default, rename = "_csrf")]
    pub csrf: String,
}

impl ProfileForm {
    /// Localized messages for every field that fails its constraint
    pub fn validate(&self, state: &AppState, lang: &str) -> Vec<String> {
        let mut errors = Vec::new();
        let mut max_size = |label: &str, value: &str, max: usize| {
            if value.chars().count() > max {
                errors.push(tr(lang, "form.max_size_error", &[&tr(lang, label, &[]), &max.to_string()]));
            }
        };
        max_size("auth.username", &self.name, 40);
        max_size("settings.full_name", &self.full_name, 100);
        max_size("settings.website", &self.website, 255);
        max_size("settings.location", &self.location, 50);
        max_size("settings.biography", &self.description, 255);

        if !self.name.is_empty() && !users::has_valid_name_chars(&self.name) {
            errors.push(tr(lang, "user.form.name_chars_not_allowed", &[&self.name]));
        }
        if !self.website.is_empty() && !URL_PATTERN.is_match(&self.website) {
            errors.push(tr(lang, "form.url_error", &[&self.website]));
        }
        if !state.settings.is_visibility_allowed(&self.visibility) {
            errors.push(tr(lang, "form.invalid_visibility", &[]));
        }
        errors
    }
}

#[derive(Serialize)]
struct ProfileView {
    name: String,
    full_name: String,
    email: String,
    keep_email_private: bool,
    website: String,
    location: String,
    description: String,
    visibility: String,
    keep_activity_private: bool,
    is_local: bool,
    avatar_email: String,
    use_custom_avatar: bool,
    avatar_link: String,
}

impl ProfileView {
    fn new(state: &AppState, u: &user::Model) -> Self {
        Self {
            name: u.name.clone(),
            full_name: u.full_name.clone(),
            email: u.email.clone(),
            keep_email_private: u.keep_email_private,
            website: u.website.clone(),
            location: u.location.clone(),
            description: u.description.clone(),
            visibility: u.visibility.clone(),
            keep_activity_private: u.keep_activity_private,
            is_local: u.is_local(),
            avatar_email: u.avatar_email.clone(),
            use_custom_avatar: u.use_custom_avatar,
            avatar_link: avatar_link(&state.settings, u),
        }
    }

    /// Echo a rejected submission back into the form
    fn with_form(mut self, form: &ProfileForm) -> Self {
        self.name = form.name.clone();
        self.full_name = form.full_name.clone();
        self.keep_email_private = is_checked(form.keep_email_private.as_deref());
        self.website = form.website.clone();
        self.location = form.location.clone();
        self.description = form.description.clone();
        self.visibility = form.visibility.clone();
        self.keep_activity_private = is_checked(form.keep_activity_private.as_deref());
        self
    }
}

fn profile_page(state: &AppState, headers: &HeaderMap, current: &CurrentUser, profile: ProfileView, errors: &[String]) -> Response {
    let mut page = PageContext::new(state, headers, Some(current));
    page.insert("page_is_settings_profile", &true);
    page.insert("profile", &profile);
    page.insert("allowed_visibility_modes", &state.settings.service.allowed_user_visibility_modes);
    page.insert("max_avatar_file_size", &state.settings.avatar.max_file_size);
    page.insert("errors", errors);
    page.render("user/settings/profile.html")
}

/// Profile page (GET /user/settings)
pub async fn settings_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let current = match require_user(&state, &headers).await {
        Ok(current) => current,
        Err(redirect) => return redirect,
    };
    let profile = ProfileView::new(&state, &current.user);
    profile_page(&state, &headers, &current, profile, &[])
}

/// Flash text for rename failures the user can fix
pub fn username_change_flash(lang: &str, err: &UserError, new_name: &str) -> Option<String> {
    let key = match err {
        UserError::NotLocal(_) => "form.username_change_not_local_user",
        UserError::AlreadyExist(_) => "form.username_been_taken",
        UserError::EmailAlreadyUsed(_) => "form.email_been_used",
        UserError::NameReserved(_) => "user.form.name_reserved",
        UserError::NamePatternNotAllowed(_) => "user.form.name_pattern_not_allowed",
        UserError::NameCharsNotAllowed(_) => "user.form.name_chars_not_allowed",
        _ => return None,
    };
    Some(tr(lang, key, &[new_name]))
}

/// Rename `u`, also rewriting owner names of their repositories and agit pull request heads
pub async fn handle_username_change(state: &AppState, u: &user::Model, new_name: &str) -> Result<(), UserError> {
    if !u.is_local() {
        return Err(UserError::NotLocal(u.name.clone()));
    }

    if u.lower_name != new_name.to_lowercase() {
        users::change_user_name(&state.db, &state.settings, u, new_name).await?;
    } else {
        users::change_user_name_case(&state.db, u, new_name).await?;
    }

    tracing::trace!("User name changed: {} -> {}", u.name, new_name);
    Ok(())
}

/// Update profile (POST /user/settings)
pub async fn profile_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ProfileForm>,
) -> Response {
    let current = match require_user(&state, &headers).await {
        Ok(current) => current,
        Err(redirect) => return redirect,
    };
    let lang = super::utils::resolve_locale(&state.settings, &headers);
    if !current.check_csrf(&form.csrf) {
        return invalid_csrf(&lang);
    }

    let errors = form.validate(&state, &lang);
    if !errors.is_empty() {
        let profile = ProfileView::new(&state, &current.user).with_form(&form);
        return profile_page(&state, &headers, &current, profile, &errors);
    }

    let mut u = current.user.clone();
    let new_name = form.name;
    u.full_name = form.full_name;
    if !form.email.is_empty() {
        u.email = form.email;
    }
    u.keep_email_private = is_checked(form.keep_email_private.as_deref());
    u.website = form.website;
    u.location = form.location;
    u.description = form.description;
    u.keep_activity_private = is_checked(form.keep_activity_private.as_deref());
    u.visibility = form.visibility;

    let email_taken = || {
        redirect_with_flash(
            &state.settings,
            "/user/settings",
            Flash::error(tr(&lang, "form.email_been_used", &[])),
        )
    };

    // a rejected setting must not leave a completed rename behind
    match users::validate_user_setting(&state.db, &state.settings, &u).await {
        Ok(()) => {}
        Err(UserError::EmailAlreadyUsed(_)) => return email_taken(),
        Err(e) => return ServerError::from(e).into_response(),
    }

    if !new_name.is_empty() && u.name != new_name {
        tracing::debug!("Changing name for {} to {}", u.name, new_name);
        if let Err(e) = handle_username_change(&state, &u, &new_name).await {
            return match username_change_flash(&lang, &e, &new_name) {
                Some(message) => redirect_with_flash(&state.settings, "/user/settings", Flash::error(message)),
                None => ServerError::from(e).into_response(),
            };
        }
        u.lower_name = new_name.to_lowercase();
        u.name = new_name;
    }

    let u = match users::update_user_setting(&state.db, &state.settings, &u).await {
        Ok(updated) => updated,
        Err(UserError::EmailAlreadyUsed(_)) => return email_taken(),
        Err(e) => return ServerError::from(e).into_response(),
    };

    tracing::trace!("User settings updated: {}", u.name);
    let flash = Flash::success(tr(&u.language, "settings.update_profile_success", &[]));
    see_other(
        &state.settings,
        "/user/settings",
        &[locale_cookie(&state.settings, &u.language), flash.to_cookie(&state.settings)],
    )
}
