//! Avatar settings and avatar image serving.

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::avatar;
use crate::config::Settings;
use crate::db::entities::user;
use crate::db::users::{self, UserError};
use crate::error::ServerError;
use crate::i18n::tr;
use crate::state::AppState;
use crate::storage::{namespaces, StorageError};
use crate::typesniffer;
use super::utils::{invalid_csrf, redirect_with_flash, require_user, resolve_locale, Flash};

#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("uploaded avatar is {size} bytes, limit is {max}")]
    TooBig { size: u64, max: u64 },

    #[error("uploaded avatar is not an image")]
    NotAnImage,

    #[error("Image width is too large: {0} > {1}")]
    TooWide(u32, u32),

    #[error("Image height is too large: {0} > {1}")]
    TooHigh(u32, u32),

    #[error("UploadAvatar: {0}")]
    Storage(#[from] StorageError),

    #[error("UpdateUser: {0}")]
    User(#[from] UserError),

    #[error("Avatar: {0}")]
    Io(#[from] std::io::Error),
}

impl AvatarError {
    /// Text flashed to the user
    pub fn message(&self, lang: &str) -> String {
        match self {
            AvatarError::TooBig { size, max } => tr(
                lang,
                "settings.uploaded_avatar_is_too_big",
                &[&(size / 1024).to_string(), &(max / 1024).to_string()],
            ),
            AvatarError::NotAnImage => tr(lang, "settings.uploaded_avatar_not_a_image", &[]),
            other => other.to_string(),
        }
    }
}

/// A file part of a multipart form
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

#[derive(Default)]
pub struct AvatarForm {
    /// `local` selects a custom avatar
    pub source: String,
    pub gravatar: String,
    /// Present when the form carried an `avatar` part, even an empty one
    pub avatar: Option<UploadedFile>,
    pub csrf: String,
}

impl AvatarForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ServerError> {
        let bad_request = |e: axum::extract::multipart::MultipartError| ServerError::InvalidRequest(e.to_string());
        let mut form = AvatarForm::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
            match field.name().unwrap_or("") {
                "source" => form.source = field.text().await.map_err(bad_request)?,
                "gravatar" => form.gravatar = field.text().await.map_err(bad_request)?,
                "_csrf" => form.csrf = field.text().await.map_err(bad_request)?,
                "avatar" => {
                    let file_name = field.file_name().unwrap_or("").to_string();
                    let data = field.bytes().await.map_err(bad_request)?;
                    form.avatar = Some(UploadedFile { file_name, data });
                }
                _ => {}
            }
        }
        Ok(form)
    }
}

/// URL of the avatar image shown for `u`
pub fn avatar_link(settings: &Settings, u: &user::Model) -> String {
    if !u.avatar.is_empty() {
        return settings.app_url(&format!("/avatars/{}", u.avatar));
    }
    let seed = if u.avatar_email.is_empty() { &u.email } else { &u.avatar_email };
    settings.app_url(&format!("/avatars/{}", avatar::hash_email(seed)))
}

/// Store `data` as the custom avatar of `u` after checking its dimensions
pub async fn upload_avatar(state: &AppState, u: &mut user::Model, data: &[u8]) -> Result<(), AvatarError> {
    let (width, height) = avatar::image_dimensions(data).ok_or(AvatarError::NotAnImage)?;
    let limits = &state.settings.avatar;
    if width > limits.max_width {
        return Err(AvatarError::TooWide(width, limits.max_width));
    }
    if height > limits.max_height {
        return Err(AvatarError::TooHigh(height, limits.max_height));
    }

    let key = avatar::custom_avatar_key(u.id, data);
    state
        .avatars
        .put(namespaces::AVATARS, &key, Bytes::copy_from_slice(data))
        .await?;
    u.use_custom_avatar = true;
    u.avatar = key;
    Ok(())
}

/// Store an identicon seeded from the email (or the name) as the avatar of `u`
pub async fn generate_random_avatar(state: &AppState, u: &mut user::Model) -> Result<(), AvatarError> {
    let seed = if u.email.is_empty() { &u.name } else { &u.email };
    let key = avatar::hash_email(seed);
    let image = avatar::random_image(key.as_bytes())?;
    state
        .avatars
        .put(namespaces::AVATARS, &key, Bytes::from(image))
        .await?;
    tracing::info!("New random avatar created: {}", u.id);
    u.avatar = key;
    Ok(())
}

/// Apply the avatar form to `u` and persist the avatar columns
pub async fn update_avatar_setting(
    state: &AppState,
    form: &AvatarForm,
    u: &user::Model,
) -> Result<user::Model, AvatarError> {
    let mut u = u.clone();
    u.use_custom_avatar = form.source == "local";
    if !form.gravatar.is_empty() {
        u.avatar = if form.avatar.is_some() {
            avatar::hash_email(&form.gravatar)
        } else {
            String::new()
        };
        u.avatar_email = form.gravatar.clone();
    }

    match form.avatar.as_ref().filter(|f| !f.file_name.is_empty()) {
        Some(file) => {
            let max = state.settings.avatar.max_file_size;
            if file.data.len() as u64 > max {
                return Err(AvatarError::TooBig {
                    size: file.data.len() as u64,
                    max,
                });
            }
            let sniffed = typesniffer::detect_content_type(&file.data);
            if !(sniffed.is_image() && !sniffed.is_svg_image()) {
                return Err(AvatarError::NotAnImage);
            }
            upload_avatar(state, &mut u, &file.data).await?;
        }
        None if u.use_custom_avatar && u.avatar.is_empty() => {
            if let Err(e) = generate_random_avatar(state, &mut u).await {
                tracing::error!("GenerateRandomAvatar[{}]: {}", u.id, e);
            }
        }
        None => {}
    }

    users::update_avatar_columns(&state.db, &u).await?;
    Ok(u)
}

/// Remove the custom avatar of `u` and reset the avatar columns
pub async fn delete_avatar(state: &AppState, u: &user::Model) -> Result<(), AvatarError> {
    if u.use_custom_avatar && !u.avatar.is_empty() {
        match state.avatars.delete(namespaces::AVATARS, &u.avatar).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    let mut u = u.clone();
    u.use_custom_avatar = false;
    u.avatar = String::new();
    users::update_avatar_columns(&state.db, &u).await?;
    Ok(())
}

/// Update avatar (POST /user/settings/avatar)
pub async fn avatar_post(State(state): State<Arc<AppState>>, headers: HeaderMap, multipart: Multipart) -> Response {
    let current = match require_user(&state, &headers).await {
        Ok(current) => current,
        Err(redirect) => return redirect,
    };
    let lang = resolve_locale(&state.settings, &headers);
    let form = match AvatarForm::from_multipart(multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };
    if !current.check_csrf(&form.csrf) {
        return invalid_csrf(&lang);
    }

    let flash = match update_avatar_setting(&state, &form, &current.user).await {
        Ok(_) => Flash::success(tr(&lang, "settings.update_avatar_success", &[])),
        Err(e) => {
            tracing::debug!("Avatar update for {} rejected: {}", current.user.name, e);
            Flash::error(e.message(&lang))
        }
    };
    redirect_with_flash(&state.settings, "/user/settings", flash)
}

#[derive(serde::Deserialize)]
pub struct CsrfForm {
    #[serde(default, rename = "_csrf")]
    pub csrf: String,
}

/// Delete avatar (POST /user/settings/avatar/delete)
pub async fn delete_avatar_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::extract::Form(form): axum::extract::Form<CsrfForm>,
) -> Response {
    let current = match require_user(&state, &headers).await {
        Ok(current) => current,
        Err(redirect) => return redirect,
    };
    let lang = resolve_locale(&state.settings, &headers);
    if !current.check_csrf(&form.csrf) {
        return invalid_csrf(&lang);
    }

    if let Err(e) = delete_avatar(&state, &current.user).await {
        return redirect_with_flash(&state.settings, "/user/settings", Flash::error(e.message(&lang)));
    }
    super::utils::see_other(&state.settings, "/user/settings", &[])
}

/// Avatar image (GET /avatars/:hash); unknown hashes get an identicon
pub async fn serve_avatar(State(state): State<Arc<AppState>>, Path(hash): Path<String>) -> Response {
    let data = match state.avatars.get(namespaces::AVATARS, &hash).await {
        Ok(data) => data,
        Err(StorageError::NotFound(_)) if !hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            match avatar::random_image(hash.as_bytes()) {
                Ok(image) => Bytes::from(image),
                Err(e) => return ServerError::from(e).into_response(),
            }
        }
        Err(StorageError::NotFound(_)) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => return ServerError::from(e).into_response(),
    };

    let content_type = typesniffer::detect_content_type(&data).mime_type().to_string();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public,max-age=86400")
        .body(Body::from(data))
        .unwrap_or_else(|e| ServerError::Internal(e.to_string()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{create_user, get_user_by_id, NewUser};
    use crate::state::tests::{test_state, test_state_with};
    use crate::web_ui::routes::test_support::{location, send, send_get, signed_in};
    use axum::http::Request;
    use tempfile::TempDir;

    const BOUNDARY: &str = "----gitforge-test";

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d];
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0, 0, 0, 0, 0]);
        data
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", BOUNDARY, name, value)
                    .as_bytes(),
            );
        }
        if let Some((file_name, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post_avatar(state: &Arc<AppState>, cookie: &str, body: Vec<u8>) -> Response {
        let req = Request::builder()
            .method("POST")
            .uri("/user/settings/avatar")
            .header("cookie", cookie)
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();
        send(state, req).await
    }

    fn flash_of(resp: &Response) -> Flash {
        let cookie = resp.headers().get("set-cookie").unwrap().to_str().unwrap();
        let value = cookie.trim_start_matches("flash=").split(';').next().unwrap();
        serde_urlencoded::from_str(value).unwrap()
    }

    #[tokio::test]
    async fn test_upload_custom_avatar() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path()).await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let (cookie, csrf) = signed_in(&state, &alice);
        let image = png(64, 64);

        let body = multipart_body(&[("_csrf", &csrf), ("source", "local")], Some(("me.png", &image)));
        let resp = post_avatar(&state, &cookie, body).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/user/settings");
        assert_eq!(flash_of(&resp).kind, "success");

        let updated = get_user_by_id(&state.db, alice.id).await.unwrap();
        assert!(updated.use_custom_avatar);
        assert_eq!(updated.avatar, avatar::custom_avatar_key(alice.id, &image));
        let stored = state.avatars.get(namespaces::AVATARS, &updated.avatar).await.unwrap();
        assert_eq!(stored.as_ref(), image.as_slice());

        let resp = send_get(&state, &format!("/avatars/{}", updated.avatar), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn test_rejected_uploads() {
        let dir = TempDir::new().unwrap();
        let state = test_state_with(dir.path(), |s| {
            s.avatar.max_file_size = 2048;
            s.avatar.max_width = 100;
        })
        .await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let (cookie, csrf) = signed_in(&state, &alice);

        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>".to_vec();
        let mut big = png(10, 10);
        big.resize(4096, 0);
        let cases: Vec<(&str, Vec<u8>, &str)> = vec![
            ("a.svg", svg, "The uploaded file is not an image."),
            ("a.txt", b"hello".to_vec(), "The uploaded file is not an image."),
            ("a.png", big, "The uploaded file size (4 KiB) exceeds the maximum size (2 KiB)."),
            ("a.png", png(200, 10), "Image width is too large: 200 > 100"),
        ];
        for (name, data, expected) in cases {
            let body = multipart_body(&[("_csrf", &csrf), ("source", "local")], Some((name, &data)));
            let resp = post_avatar(&state, &cookie, body).await;
            assert_eq!(resp.status(), StatusCode::SEE_OTHER);
            let flash = flash_of(&resp);
            assert_eq!(flash.kind, "error");
            assert_eq!(flash.message, expected);
        }

        let unchanged = get_user_by_id(&state.db, alice.id).await.unwrap();
        assert!(!unchanged.use_custom_avatar);
        assert_eq!(unchanged.avatar, "");
    }

    #[tokio::test]
    async fn test_custom_mode_without_upload_generates_identicon() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path()).await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();

        let form = AvatarForm {
            source: "local".to_string(),
            ..Default::default()
        };
        let updated = update_avatar_setting(&state, &form, &alice).await.unwrap();
        assert_eq!(updated.avatar, avatar::hash_email("alice@example.com"));
        assert!(state
            .avatars
            .exists(namespaces::AVATARS, &updated.avatar)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_gravatar_email() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path()).await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();

        // no avatar part at all: the hash is cleared
        let form = AvatarForm {
            source: "lookup".to_string(),
            gravatar: "me@example.org".to_string(),
            ..Default::default()
        };
        let updated = update_avatar_setting(&state, &form, &alice).await.unwrap();
        assert_eq!(updated.avatar_email, "me@example.org");
        assert_eq!(updated.avatar, "");
        assert!(!updated.use_custom_avatar);

        // an empty file part still counts as sent
        let form = AvatarForm {
            source: "lookup".to_string(),
            gravatar: "me@example.org".to_string(),
            avatar: Some(UploadedFile {
                file_name: String::new(),
                data: Bytes::new(),
            }),
            ..Default::default()
        };
        let updated = update_avatar_setting(&state, &form, &alice).await.unwrap();
        assert_eq!(updated.avatar, avatar::hash_email("me@example.org"));
    }

    #[tokio::test]
    async fn test_delete_avatar() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path()).await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let mut u = alice.clone();
        upload_avatar(&state, &mut u, &png(8, 8)).await.unwrap();
        users::update_avatar_columns(&state.db, &u).await.unwrap();

        let (cookie, csrf) = signed_in(&state, &alice);
        let req = Request::builder()
            .method("POST")
            .uri("/user/settings/avatar/delete")
            .header("cookie", &cookie)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("_csrf={}", csrf)))
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let cleared = get_user_by_id(&state.db, alice.id).await.unwrap();
        assert!(!cleared.use_custom_avatar);
        assert_eq!(cleared.avatar, "");
        assert!(!state.avatars.exists(namespaces::AVATARS, &u.avatar).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_avatar_hash_serves_identicon() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path()).await;
        let resp = send_get(&state, &format!("/avatars/{}", avatar::hash_email("x@example.com")), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");

        let resp = send_get(&state, "/avatars/not-hex", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
