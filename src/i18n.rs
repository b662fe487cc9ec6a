//! Message catalogs and locale negotiation.
//!
//! Messages use positional placeholders (`{0}`, `{1}`). Lookups fall back to
//! `en-US` and finally to the key itself, so a missing translation shows up
//! as the key rather than an empty string.

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub const DEFAULT_LANG: &str = "en-US";

const EN_US: &[(&str, &str)] = &[
    ("settings", "Settings"),
    ("settings.profile", "Profile"),
    ("settings.public_profile", "Public Profile"),
    ("settings.avatar", "Avatar"),
    ("settings.appearance", "Appearance"),
    ("settings.organization", "Organizations"),
    ("settings.repos", "Repositories"),
    ("settings.update_profile", "Update Profile"),
    ("settings.update_profile_success", "Your profile has been updated."),
    ("settings.change_username_prompt", "Note: Changing your username also changes your account URL."),
    ("settings.full_name", "Full Name"),
    ("settings.website", "Website"),
    ("settings.location", "Location"),
    ("settings.biography", "Biography"),
    ("settings.privacy", "Privacy"),
    ("settings.keep_email_private", "Hide Email Address"),
    ("settings.keep_activity_private", "Hide Activity from profile page"),
    ("settings.visibility", "Visibility"),
    ("settings.visibility.public", "Public"),
    ("settings.visibility.limited", "Limited"),
    ("settings.visibility.private", "Private"),
    ("settings.choose_new_avatar", "Choose new avatar"),
    ("settings.use_custom_avatar", "Use Custom Avatar"),
    ("settings.update_avatar", "Update Avatar"),
    ("settings.delete_current_avatar", "Delete Current Avatar"),
    ("settings.uploaded_avatar_not_a_image", "The uploaded file is not an image."),
    ("settings.uploaded_avatar_is_too_big", "The uploaded file size ({0} KiB) exceeds the maximum size ({1} KiB)."),
    ("settings.update_avatar_success", "Your avatar has been updated."),
    ("settings.manage_themes", "Select default theme"),
    ("settings.update_theme", "Update Theme"),
    ("settings.theme_update_success", "Your theme was updated."),
    ("settings.theme_update_error", "The selected theme does not exist."),
    ("settings.language", "Language"),
    ("settings.update_language", "Update Language"),
    ("settings.update_language_success", "Language has been updated."),
    ("settings.update_language_not_found", "Language \"{0}\" is not available."),
    ("settings.hidden_comment_types", "Hidden comment types"),
    ("settings.hidden_comment_types_description", "Comment types checked here will not be shown inside issue pages."),
    ("settings.save_application", "Save"),
    ("settings.saved_successfully", "Your settings were saved successfully."),
    ("settings.orgs_none", "You are not a member of any organizations."),
    ("settings.repos_none", "You do not own any repositories."),
    ("settings.adopt", "Adopt Files"),
    ("settings.delete", "Delete Files"),
    ("settings.unadopted", "Unadopted repository"),
    ("form.username_been_taken", "The username is already taken."),
    ("form.username_change_not_local_user", "Non-local users are not allowed to change their username."),
    ("form.email_been_used", "The email address is already used."),
    ("form.require_error", "{0} cannot be empty."),
    ("form.max_size_error", "{0} must contain at most {1} characters."),
    ("form.url_error", "`{0}` is not a valid URL."),
    ("form.invalid_visibility", "The selected visibility is not allowed."),
    ("form.invalid_csrf", "Bad Request: invalid CSRF token"),
    ("user.form.name_reserved", "The username \"{0}\" is reserved."),
    ("user.form.name_pattern_not_allowed", "The pattern \"{0}\" is not allowed in a username."),
    ("user.form.name_chars_not_allowed", "User name \"{0}\" contains invalid characters."),
    ("auth.sign_in", "Sign In"),
    ("auth.sign_out", "Sign Out"),
    ("auth.username", "Username"),
    ("auth.password", "Password"),
    ("auth.invalid_credentials", "Username or password is incorrect."),
    ("repo.fork", "Fork of"),
    ("repo.private", "Private"),
    ("comment.reference", "Reference"),
    ("comment.label", "Label"),
    ("comment.milestone", "Milestone"),
    ("comment.assignee", "Assignee"),
    ("comment.title", "Title"),
    ("comment.branch", "Branch"),
    ("comment.time_tracking", "Time tracking"),
    ("comment.deadline", "Deadline"),
    ("comment.dependency", "Dependency"),
    ("comment.lock", "Lock"),
    ("comment.review_request", "Review request"),
    ("comment.pull_request_push", "Added commits"),
    ("comment.project", "Project"),
    ("comment.issue_ref", "Issue reference"),
    ("error.not_found", "The page you are trying to reach either does not exist or you are not authorized to view it."),
    ("error.server_internal", "Internal Server Error"),
];

const DE_DE: &[(&str, &str)] = &[
    ("settings", "Einstellungen"),
    ("settings.profile", "Profil"),
    ("settings.public_profile", "Öffentliches Profil"),
    ("settings.avatar", "Profilbild"),
    ("settings.appearance", "Aussehen"),
    ("settings.organization", "Organisationen"),
    ("settings.repos", "Repositories"),
    ("settings.update_profile", "Profil aktualisieren"),
    ("settings.update_profile_success", "Dein Profil wurde aktualisiert."),
    ("settings.full_name", "Vollständiger Name"),
    ("settings.website", "Webseite"),
    ("settings.location", "Standort"),
    ("settings.biography", "Biografie"),
    ("settings.privacy", "Datenschutz"),
    ("settings.keep_email_private", "E-Mail-Adresse verbergen"),
    ("settings.visibility", "Sichtbarkeit"),
    ("settings.visibility.public", "Öffentlich"),
    ("settings.visibility.limited", "Begrenzt"),
    ("settings.visibility.private", "Privat"),
    ("settings.update_avatar", "Profilbild aktualisieren"),
    ("settings.delete_current_avatar", "Aktuelles Profilbild löschen"),
    ("settings.uploaded_avatar_not_a_image", "Die hochgeladene Datei ist kein Bild."),
    ("settings.uploaded_avatar_is_too_big", "Die hochgeladene Datei ({0} KiB) überschreitet die maximale Größe ({1} KiB)."),
    ("settings.update_avatar_success", "Dein Profilbild wurde geändert."),
    ("settings.update_theme", "Theme ändern"),
    ("settings.theme_update_success", "Deine Theme-Auswahl wurde gespeichert."),
    ("settings.theme_update_error", "Das ausgewählte Theme existiert nicht."),
    ("settings.language", "Sprache"),
    ("settings.update_language", "Sprache aktualisieren"),
    ("settings.update_language_success", "Sprache wurde aktualisiert."),
    ("settings.update_language_not_found", "Sprache „{0}“ ist nicht verfügbar."),
    ("settings.saved_successfully", "Die Einstellungen wurden erfolgreich gespeichert."),
    ("form.username_been_taken", "Der Benutzername ist bereits vergeben."),
    ("form.username_change_not_local_user", "Nicht-lokale Benutzer dürfen ihren Nutzernamen nicht ändern."),
    ("form.email_been_used", "Die E-Mail-Adresse wird bereits verwendet."),
    ("user.form.name_reserved", "Der Benutzername „{0}“ ist reserviert."),
    ("user.form.name_pattern_not_allowed", "Das Muster „{0}“ ist nicht in einem Benutzernamen erlaubt."),
    ("user.form.name_chars_not_allowed", "Benutzername „{0}“ enthält ungültige Zeichen."),
    ("auth.sign_in", "Anmelden"),
    ("auth.sign_out", "Abmelden"),
];

static CATALOGS: Lazy<HashMap<&'static str, HashMap<&'static str, &'static str>>> = Lazy::new(|| {
    let mut catalogs = HashMap::new();
    catalogs.insert("en-US", EN_US.iter().copied().collect());
    catalogs.insert("de-DE", DE_DE.iter().copied().collect());
    catalogs
});

/// Translate `key` for `lang`, substituting `{0}`, `{1}`, ... with `args`
pub fn tr(lang: &str, key: &str, args: &[&str]) -> String {
    let message = CATALOGS
        .get(lang)
        .and_then(|c| c.get(key))
        .or_else(|| CATALOGS.get(DEFAULT_LANG).and_then(|c| c.get(key)))
        .copied()
        .unwrap_or(key);

    let mut out = message.to_string();
    for (i, arg) in args.iter().enumerate() {
        out = out.replace(&format!("{{{}}}", i), arg);
    }
    out
}

/// Pick the first `Accept-Language` entry that is an available language.
///
/// Matching ignores case and also accepts a bare primary tag (`de` for `de-DE`).
pub fn match_accept_language(header: &str, available: &[String]) -> Option<String> {
    let mut ranked: Vec<(f32, &str)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.trim().split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let q = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse().ok())
                .unwrap_or(1.0);
            Some((q, tag))
        })
        .collect();
    // stable, so equal weights keep header order
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    for (_, tag) in ranked {
        if let Some(lang) = available.iter().find(|l| l.eq_ignore_ascii_case(tag)) {
            return Some(lang.clone());
        }
        if let Some(lang) = available.iter().find(|l| {
            l.split('-')
                .next()
                .is_some_and(|primary| primary.eq_ignore_ascii_case(tag))
        }) {
            return Some(lang.clone());
        }
    }
    None
}

/// Tera function: `{{ tr(key="settings.profile", lang=lang) }}`
pub fn tera_tr(args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
    let key = args
        .get("key")
        .and_then(|v| v.as_str())
        .ok_or_else(|| tera::Error::msg("tr: missing `key`"))?;
    let lang = args
        .get("lang")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_LANG);
    let arg0 = args.get("arg").and_then(|v| v.as_str()).unwrap_or("");
    Ok(tera::Value::String(tr(lang, key, &[arg0])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tr_fallbacks() {
        assert_eq!(tr("de-DE", "settings.profile", &[]), "Profil");
        // missing in de-DE, present in en-US
        assert_eq!(tr("de-DE", "settings.repos_none", &[]), "You do not own any repositories.");
        assert_eq!(tr("xx-XX", "settings.profile", &[]), "Profile");
        assert_eq!(tr("en-US", "no.such.key", &[]), "no.such.key");
    }

    #[test]
    fn test_tr_arguments() {
        assert_eq!(
            tr("en-US", "settings.uploaded_avatar_is_too_big", &["2048", "1024"]),
            "The uploaded file size (2048 KiB) exceeds the maximum size (1024 KiB)."
        );
        assert_eq!(
            tr("en-US", "user.form.name_reserved", &["admin"]),
            "The username \"admin\" is reserved."
        );
    }

    #[test]
    fn test_accept_language() {
        let langs = vec!["en-US".to_string(), "de-DE".to_string()];
        assert_eq!(match_accept_language("de-DE,de;q=0.9", &langs).as_deref(), Some("de-DE"));
        assert_eq!(match_accept_language("fr;q=0.9, de;q=0.8", &langs).as_deref(), Some("de-DE"));
        assert_eq!(match_accept_language("en-us", &langs).as_deref(), Some("en-US"));
        assert_eq!(match_accept_language("ja", &langs), None);
    }
}
