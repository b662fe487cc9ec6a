//! User queries and updates: name validation, renames, profile settings.

use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};

use super::entities::{repository, user, user_redirect, user_setting};
use super::{now_unix, pulls};
use crate::config::Settings;

/// User setting holding the hidden comment types bitmask as a decimal string
pub const SETTINGS_KEY_HIDDEN_COMMENT_TYPES: &str = "issue.hidden_comment_types";

const RESERVED_USERNAMES: &[&str] = &[
    ".",
    "..",
    ".well-known",
    "admin",
    "api",
    "assets",
    "attachments",
    "avatar",
    "avatars",
    "captcha",
    "commits",
    "debug",
    "error",
    "explore",
    "favicon.ico",
    "ghost",
    "issues",
    "login",
    "manifest.json",
    "metrics",
    "milestones",
    "new",
    "notifications",
    "org",
    "pulls",
    "raw",
    "repo",
    "repo-avatars",
    "robots.txt",
    "search",
    "serviceworker.js",
    "ssh_info",
    "swagger.v1.json",
    "user",
    "v2",
];

const RESERVED_USER_PATTERNS: &[&str] = &["*.keys", "*.gpg", "*.rss", "*.atom"];

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\-.]").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user does not exist: {0}")]
    NotExist(String),

    #[error("user already exists: {0}")]
    AlreadyExist(String),

    #[error("email address already used: {0}")]
    EmailAlreadyUsed(String),

    #[error("name is reserved: {0}")]
    NameReserved(String),

    #[error("name pattern is not allowed: {0}")]
    NamePatternNotAllowed(String),

    #[error("name contains characters that are not allowed: {0}")]
    NameCharsNotAllowed(String),

    #[error("user is not a local user: {0}")]
    NotLocal(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("database error: {0}")]
    Db(#[from] DbErr),

    #[error("rename user directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Check `name` against reserved names and `*suffix` / `prefix*` patterns
pub fn is_usable_name(reserved: &[&str], patterns: &[&str], name: &str) -> Result<(), UserError> {
    let lower = name.trim().to_lowercase();
    if lower.is_empty() {
        return Err(UserError::NameCharsNotAllowed(name.to_string()));
    }
    if reserved.contains(&lower.as_str()) {
        return Err(UserError::NameReserved(name.to_string()));
    }
    for pattern in patterns {
        let hit = match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
            (Some(suffix), _) => lower.ends_with(suffix),
            (None, Some(prefix)) => lower.starts_with(prefix),
            _ => false,
        };
        if hit {
            return Err(UserError::NamePatternNotAllowed(pattern.to_string()));
        }
    }
    Ok(())
}

pub fn has_valid_name_chars(name: &str) -> bool {
    !name.is_empty() && !INVALID_NAME_CHARS.is_match(name)
}

/// Characters first, then reserved names, then reserved patterns
pub fn is_usable_username(name: &str) -> Result<(), UserError> {
    if !has_valid_name_chars(name) {
        return Err(UserError::NameCharsNotAllowed(name.to_string()));
    }
    is_usable_name(RESERVED_USERNAMES, RESERVED_USER_PATTERNS, name)
}

/// Truncate to at most `max` characters
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub is_admin: bool,
    pub is_org: bool,
    pub login_type: &'a str,
}

impl<'a> NewUser<'a> {
    pub fn local(name: &'a str, email: &'a str, password: &'a str) -> Self {
        Self {
            name,
            email,
            password,
            is_admin: false,
            is_org: false,
            login_type: "plain",
        }
    }
}

pub async fn create_user(db: &DatabaseConnection, new: NewUser<'_>) -> Result<user::Model, UserError> {
    is_usable_username(new.name)?;
    if is_user_exist(db, 0, new.name).await? {
        return Err(UserError::AlreadyExist(new.name.to_string()));
    }

    let salt = crate::auth::generate_salt();
    let passwd = if new.password.is_empty() {
        String::new()
    } else {
        crate::auth::hash_password(new.password, &salt)
    };
    let now = now_unix();
    let model = user::ActiveModel {
        name: Set(new.name.to_string()),
        lower_name: Set(new.name.to_lowercase()),
        full_name: Set(String::new()),
        email: Set(new.email.to_string()),
        keep_email_private: Set(false),
        website: Set(String::new()),
        location: Set(String::new()),
        description: Set(String::new()),
        keep_activity_private: Set(false),
        visibility: Set("public".to_string()),
        language: Set(String::new()),
        theme: Set(String::new()),
        avatar: Set(String::new()),
        avatar_email: Set(new.email.to_string()),
        use_custom_avatar: Set(false),
        login_type: Set(new.login_type.to_string()),
        is_admin: Set(new.is_admin),
        is_org: Set(new.is_org),
        passwd: Set(passwd),
        salt: Set(salt),
        created_unix: Set(now),
        updated_unix: Set(now),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

pub async fn get_user_by_id(db: &impl ConnectionTrait, id: i64) -> Result<user::Model, UserError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| UserError::NotExist(format!("id {}", id)))
}

pub async fn get_user_by_name(db: &impl ConnectionTrait, name: &str) -> Result<user::Model, UserError> {
    user::Entity::find()
        .filter(user::Column::LowerName.eq(name.to_lowercase()))
        .one(db)
        .await?
        .ok_or_else(|| UserError::NotExist(name.to_string()))
}

/// Whether another user (not `uid`) already has `name`
pub async fn is_user_exist(db: &impl ConnectionTrait, uid: i64, name: &str) -> Result<bool, DbErr> {
    let found = user::Entity::find()
        .filter(user::Column::LowerName.eq(name.to_lowercase()))
        .filter(user::Column::Id.ne(uid))
        .one(db)
        .await?;
    Ok(found.is_some())
}

/// Account id an old user name now redirects to
pub async fn lookup_user_redirect(db: &impl ConnectionTrait, name: &str) -> Result<Option<i64>, DbErr> {
    Ok(user_redirect::Entity::find()
        .filter(user_redirect::Column::LowerName.eq(name.to_lowercase()))
        .one(db)
        .await?
        .map(|r| r.redirect_user_id))
}

async fn new_user_redirect(
    db: &impl ConnectionTrait,
    user_id: i64,
    old_name: &str,
    new_name: &str,
) -> Result<(), DbErr> {
    user_redirect::Entity::delete_many()
        .filter(
            user_redirect::Column::LowerName
                .is_in([old_name.to_lowercase(), new_name.to_lowercase()]),
        )
        .exec(db)
        .await?;
    user_redirect::ActiveModel {
        lower_name: Set(old_name.to_lowercase()),
        redirect_user_id: Set(user_id),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

async fn update_repository_owner_names(
    db: &impl ConnectionTrait,
    owner_id: i64,
    owner_name: &str,
) -> Result<(), DbErr> {
    repository::Entity::update_many()
        .col_expr(repository::Column::OwnerName, Expr::value(owner_name))
        .filter(repository::Column::OwnerId.eq(owner_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Rename a user whose lower-case name changes.
///
/// Repository owner names, the user redirect, agit pull request heads and
/// the user row are updated in one transaction. The user's repository
/// directory is moved before commit and moved back if the commit fails.
pub async fn change_user_name(
    db: &DatabaseConnection,
    settings: &Settings,
    u: &user::Model,
    new_name: &str,
) -> Result<(), UserError> {
    if !u.is_org && !u.is_local() {
        return Err(UserError::NotLocal(u.name.clone()));
    }
    is_usable_username(new_name)?;

    let txn = db.begin().await?;

    if is_user_exist(&txn, u.id, new_name).await? {
        return Err(UserError::AlreadyExist(new_name.to_string()));
    }

    update_repository_owner_names(&txn, u.id, new_name).await?;

    let mut active: user::ActiveModel = u.clone().into();
    active.name = Set(new_name.to_string());
    active.lower_name = Set(new_name.to_lowercase());
    active.updated_unix = Set(now_unix());
    active.update(&txn).await?;

    new_user_redirect(&txn, u.id, &u.name, new_name).await?;
    pulls::user_name_changed(&txn, u, new_name).await?;

    let old_path = settings.user_path(&u.name);
    let new_path = settings.user_path(new_name);
    match tokio::fs::rename(&old_path, &new_path).await {
        Ok(()) => {}
        // users without repositories have no directory
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = txn.commit().await {
        if let Err(e2) = tokio::fs::rename(&new_path, &old_path).await {
            if e2.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(
                    "failed to roll back directory rename from {} to {}: {}",
                    u.name,
                    new_name,
                    e2
                );
            }
        }
        return Err(e.into());
    }

    tracing::info!("User renamed: {} -> {}", u.name, new_name);
    Ok(())
}

/// Apply a change that only differs in letter case
pub async fn change_user_name_case(
    db: &DatabaseConnection,
    u: &user::Model,
    new_name: &str,
) -> Result<(), UserError> {
    let txn = db.begin().await?;
    update_repository_owner_names(&txn, u.id, new_name).await?;
    pulls::user_name_changed(&txn, u, new_name).await?;

    let mut active: user::ActiveModel = u.clone().into();
    active.name = Set(new_name.to_string());
    active.updated_unix = Set(now_unix());
    active.update(&txn).await?;

    txn.commit().await?;
    Ok(())
}

/// Check the profile fields of `u` without writing anything: the visibility
/// must be allowed and the email must not belong to another account
pub async fn validate_user_setting(
    db: &impl ConnectionTrait,
    settings: &Settings,
    u: &user::Model,
) -> Result<(), UserError> {
    if !u.is_org && !settings.is_visibility_allowed(&u.visibility) {
        return Err(UserError::InvalidSetting(format!(
            "visibility mode not allowed: {}",
            u.visibility
        )));
    }

    if !u.email.is_empty() {
        let duplicate = user::Entity::find()
            .filter(Expr::expr(Func::lower(Expr::col(user::Column::Email))).eq(u.email.to_lowercase()))
            .filter(user::Column::Id.ne(u.id))
            .filter(user::Column::IsOrg.eq(u.is_org))
            .one(db)
            .await?;
        if duplicate.is_some() {
            return Err(UserError::EmailAlreadyUsed(u.email.clone()));
        }
    }

    Ok(())
}

/// Persist profile fields of `u`.
///
/// Location, website and description are truncated to 255 characters.
pub async fn update_user_setting(
    db: &DatabaseConnection,
    settings: &Settings,
    u: &user::Model,
) -> Result<user::Model, UserError> {
    validate_user_setting(db, settings, u).await?;

    let current = get_user_by_id(db, u.id).await?;
    let mut active: user::ActiveModel = current.into();
    active.full_name = Set(u.full_name.clone());
    active.email = Set(u.email.clone());
    active.keep_email_private = Set(u.keep_email_private);
    active.website = Set(truncate_chars(&u.website, 255));
    active.location = Set(truncate_chars(&u.location, 255));
    active.description = Set(truncate_chars(&u.description, 255));
    active.keep_activity_private = Set(u.keep_activity_private);
    active.visibility = Set(u.visibility.clone());
    active.language = Set(u.language.clone());
    active.updated_unix = Set(now_unix());
    Ok(active.update(db).await?)
}

pub async fn update_user_theme(db: &DatabaseConnection, user_id: i64, theme: &str) -> Result<(), UserError> {
    let current = get_user_by_id(db, user_id).await?;
    let mut active: user::ActiveModel = current.into();
    active.theme = Set(theme.to_string());
    active.update(db).await?;
    Ok(())
}

/// Persist `avatar`, `avatar_email` and `use_custom_avatar`
pub async fn update_avatar_columns(db: &DatabaseConnection, u: &user::Model) -> Result<(), UserError> {
    let current = get_user_by_id(db, u.id).await?;
    let mut active: user::ActiveModel = current.into();
    active.avatar = Set(u.avatar.clone());
    active.avatar_email = Set(u.avatar_email.clone());
    active.use_custom_avatar = Set(u.use_custom_avatar);
    active.update(db).await?;
    Ok(())
}

/// Value of a user setting, or an empty string when unset
pub async fn get_user_setting(db: &DatabaseConnection, user_id: i64, key: &str) -> Result<String, UserError> {
    Ok(user_setting::Entity::find()
        .filter(user_setting::Column::UserId.eq(user_id))
        .filter(user_setting::Column::SettingKey.eq(key))
        .one(db)
        .await?
        .map(|s| s.setting_value)
        .unwrap_or_default())
}

pub async fn set_user_setting(
    db: &DatabaseConnection,
    user_id: i64,
    key: &str,
    value: &str,
) -> Result<(), UserError> {
    let existing = user_setting::Entity::find()
        .filter(user_setting::Column::UserId.eq(user_id))
        .filter(user_setting::Column::SettingKey.eq(key))
        .one(db)
        .await?;
    match existing {
        Some(setting) => {
            let mut active: user_setting::ActiveModel = setting.into();
            active.setting_value = Set(value.to_string());
            active.update(db).await?;
        }
        None => {
            user_setting::ActiveModel {
                user_id: Set(user_id),
                setting_key: Set(key.to_string()),
                setting_value: Set(value.to_string()),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

/// Create an admin account named `name` unless some admin already exists.
/// Returns whether an account was created.
pub async fn ensure_admin_user(db: &DatabaseConnection, name: &str, password: &str) -> Result<bool, UserError> {
    let admins = user::Entity::find()
        .filter(user::Column::IsAdmin.eq(true))
        .filter(user::Column::IsOrg.eq(false))
        .count(db)
        .await?;
    if admins > 0 {
        return Ok(false);
    }
    let email = format!("{}@localhost", name.to_lowercase());
    create_user(
        db,
        NewUser {
            is_admin: true,
            ..NewUser::local(name, &email, password)
        },
    )
    .await?;
    tracing::info!("Created admin user {}", name);
    Ok(true)
}
