//! Raw and media downloads of repository files.
//!
//! `raw` serves blobs as stored in git. `media` additionally resolves Git
//! LFS pointers to the large object they stand for.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::config::Settings;
use crate::db::entities::{repository, user};
use crate::db::{lfs as lfs_db, repos, users};
use crate::error::{Result, ServerError};
use crate::git::{self, Blob, GitError, ObjectId, RefKind, Repository};
use crate::httpcache;
use crate::lfs;
use crate::state::AppState;
use crate::storage::ObjectReader;
use crate::typesniffer;
use super::utils::{format_size, get_current_user};

type DownloadPath = (String, String, String, String);

/// A repository the requester may read
struct RepoContext {
    repo: repository::Model,
    git: Arc<Repository>,
}

enum Lookup {
    Found(RepoContext),
    /// The owner was renamed; redirect to this location
    Moved(String),
}

async fn open_repo(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
    owner_name: &str,
    repo_name: &str,
) -> Result<Lookup> {
    let not_found = || ServerError::RepoNotFound(format!("{}/{}", owner_name, repo_name));

    let owner = match users::get_user_by_name(&state.db, owner_name).await {
        Ok(owner) => owner,
        Err(users::UserError::NotExist(_)) => {
            return match users::lookup_user_redirect(&state.db, owner_name).await? {
                Some(id) => {
                    let target = users::get_user_by_id(&state.db, id).await?;
                    Ok(Lookup::Moved(moved_location(&state.settings, uri, &target)))
                }
                None => Err(not_found()),
            };
        }
        Err(e) => return Err(e.into()),
    };

    let repo = repos::get_repository_by_name(&state.db, owner.id, repo_name)
        .await?
        .ok_or_else(not_found)?;

    let viewer = get_current_user(state, headers).await.map(|c| c.user);
    if !repos::can_read(&state.db, &repo, &owner, viewer.as_ref()).await? {
        return Err(not_found());
    }

    let path = state.settings.repo_path(&owner.name, &repo.name);
    let git = tokio::task::spawn_blocking(move || Repository::open(&path))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map_err(|e| match e {
            GitError::NotExist(_) => not_found(),
            other => other.into(),
        })?;

    Ok(Lookup::Found(RepoContext {
        repo,
        git: Arc::new(git),
    }))
}

/// Request path with the owner segment replaced by the new owner name
fn moved_location(settings: &Settings, uri: &Uri, target: &user::Model) -> String {
    let path = uri.path().trim_start_matches('/');
    let rest = path.split_once('/').map(|(_, rest)| rest).unwrap_or("");
    let mut location = settings.app_url(&format!("/{}/{}", target.name, rest));
    if let Some(query) = uri.query() {
        location.push('?');
        location.push_str(query);
    }
    location
}

fn wants_render(query: &HashMap<String, String>) -> bool {
    query
        .get("render")
        .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "on"))
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => tracing::warn!("Dropping header {}: {}", name, e),
    }
}

fn not_modified(headers: HeaderMap) -> Response {
    (StatusCode::NOT_MODIFIED, headers).into_response()
}

fn etag(value: &str) -> String {
    format!("\"{}\"", value)
}

/// Stream `reader` as a download named `name`.
///
/// The first bytes are sniffed to pick the content type and disposition;
/// they are sent ahead of the rest of the stream.
pub async fn serve_data(
    settings: &Settings,
    render: bool,
    mut headers: HeaderMap,
    name: &str,
    size: i64,
    mut reader: ObjectReader,
) -> Result<Response> {
    let mut buf = vec![0u8; typesniffer::SNIFF_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);

    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("public,max-age=86400"));
    if size >= 0 {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size as u64));
    } else {
        tracing::error!("ServeData called with unknown size for {}", name);
    }

    let base_name = name.rsplit('/').next().unwrap_or(name);
    let file_name = base_name.replace(',', " ");

    let mapped_mime = if settings.mime_type_map.enabled {
        std::path::Path::new(base_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| settings.mime_type_map.map.get(&format!(".{}", ext.to_lowercase())))
            .cloned()
    } else {
        None
    };

    let sniffed = typesniffer::detect_content_type(&buf);
    if sniffed.is_text() || render {
        let mime = mapped_mime.as_deref().unwrap_or("text/plain");
        set_header(&mut headers, header::CONTENT_TYPE, &format!("{}; charset=utf-8", mime));
    } else {
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("Content-Disposition"),
        );
        let is_svg = sniffed.is_svg_image();
        let is_image_or_pdf = sniffed.is_image() || sniffed.is_pdf();
        if (is_image_or_pdf && !is_svg) || (is_svg && settings.ui.svg_enabled) {
            set_header(
                &mut headers,
                header::CONTENT_DISPOSITION,
                &format!("inline; filename=\"{}\"", file_name),
            );
            if is_svg {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(typesniffer::SVG_MIME_TYPE));
                headers.insert(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static("default-src 'none'; style-src 'unsafe-inline'; sandbox"),
                );
                headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
            } else {
                set_header(&mut headers, header::CONTENT_TYPE, sniffed.mime_type());
            }
        } else {
            set_header(
                &mut headers,
                header::CONTENT_DISPOSITION,
                &format!("attachment; filename=\"{}\"", file_name),
            );
            let mime = mapped_mime.as_deref().unwrap_or(sniffed.mime_type());
            set_header(&mut headers, header::CONTENT_TYPE, mime);
        }
    }

    tracing::debug!("Serving {} ({})", file_name, format_size(size.max(0) as u64));
    let stream = ReaderStream::new(Cursor::new(buf).chain(reader));
    let mut resp = Response::new(Body::from_stream(stream));
    *resp.headers_mut() = headers;
    Ok(resp)
}

/// Serve a blob as stored in git
pub async fn serve_blob(
    settings: &Settings,
    req: &HeaderMap,
    render: bool,
    blob: &Blob,
    last_modified: Option<DateTime<Utc>>,
) -> Result<Response> {
    let mut headers = HeaderMap::new();
    if httpcache::handle_generic_etag_time_cache(req, &mut headers, settings, &etag(&blob.id.to_hex()), last_modified) {
        return Ok(not_modified(headers));
    }
    let size = blob.size() as i64;
    serve_data(settings, render, headers, &blob.name, size, Box::new(blob.data_async())).await
}

/// Serve a blob, or the LFS object it points at when the repository knows it
pub async fn serve_blob_or_lfs(
    state: &AppState,
    req: &HeaderMap,
    render: bool,
    repo: &repository::Model,
    blob: &Blob,
    last_modified: Option<DateTime<Utc>>,
) -> Result<Response> {
    let settings = &state.settings;
    let mut headers = HeaderMap::new();
    if httpcache::handle_generic_etag_time_cache(req, &mut headers, settings, &etag(&blob.id.to_hex()), last_modified) {
        return Ok(not_modified(headers));
    }

    let mut data = blob.data_async();
    let pointer = lfs::read_pointer(&mut data).await.ok().filter(lfs::Pointer::is_valid);
    drop(data);

    if let Some(pointer) = pointer {
        let meta = lfs_db::get_lfs_meta_object_by_oid(&state.db, repo.id, &pointer.oid)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("GetLFSMetaObjectByOid {} in {}: {}", pointer.oid, repo.full_name(), e);
                None
            });

        if let Some(meta) = meta {
            if httpcache::handle_generic_etag_cache(req, &mut headers, settings, &etag(&pointer.oid)) {
                return Ok(not_modified(headers));
            }

            if settings.lfs.serve_direct {
                match state.lfs.url(&pointer, &blob.name).await {
                    Ok(Some(url)) => {
                        let mut resp = (StatusCode::FOUND, headers).into_response();
                        set_header(resp.headers_mut(), header::LOCATION, &url);
                        return Ok(resp);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::debug!("No direct URL for LFS object {}: {}", pointer.oid, e),
                }
            }

            let reader = state.lfs.get(&pointer).await?;
            return serve_data(settings, render, headers, &blob.name, meta.size, reader).await;
        }
        tracing::trace!("LFS pointer {} has no meta object in {}", pointer.oid, repo.full_name());
    }

    serve_blob(settings, req, render, blob, last_modified).await
}

/// Blob at `<ref>/<path>` plus the committer time of the last commit touching it
async fn blob_for_entry(
    state: &Arc<AppState>,
    ctx: &RepoContext,
    kind: RefKind,
    rest: String,
) -> Result<(Blob, Option<DateTime<Utc>>)> {
    let state = state.clone();
    let full_name = ctx.repo.full_name();
    let (blob, time) = git::blocking(&ctx.git, move |repo| {
        let (commit_id, path) = repo.resolve_ref_path(kind, &rest)?;
        if path.is_empty() {
            return Err(GitError::NotExist("blob at repository root".to_string()));
        }
        let commit = repo.get_commit(&commit_id)?;
        let entry = repo.get_tree_entry_by_path(&commit, &path)?;
        if entry.is_dir() || entry.is_submodule() {
            return Err(GitError::NotExist(format!("blob at {}", path)));
        }

        let cache = &state.settings.cache;
        let time = if cache.last_commit_enabled
            && repo.commits_count(&commit_id)? >= cache.last_commit_commits_count
        {
            state
                .last_commit_cache
                .last_commit_time(repo, &full_name, &commit_id, &path)?
        } else {
            repo.last_commit_for_path(&commit_id, &path)?.committer_time
        };
        Ok((repo.entry_blob(&entry)?, time))
    })
    .await?;
    Ok((blob, DateTime::from_timestamp(time, 0)))
}

async fn blob_by_id(ctx: &RepoContext, sha: &str) -> Result<Blob> {
    let id = ObjectId::from_hex(sha).ok_or_else(|| ServerError::NotFound(format!("blob {}", sha)))?;
    Ok(git::blocking(&ctx.git, move |repo| repo.get_blob(&id)).await?)
}

/// Download a file by its path at a branch, tag or commit
pub async fn single_download(
    state: &Arc<AppState>,
    req: &HeaderMap,
    render: bool,
    ctx: &RepoContext,
    kind: RefKind,
    rest: String,
) -> Result<Response> {
    let (blob, last_modified) = blob_for_entry(state, ctx, kind, rest).await?;
    serve_blob(&state.settings, req, render, &blob, last_modified).await
}

pub async fn single_download_or_lfs(
    state: &Arc<AppState>,
    req: &HeaderMap,
    render: bool,
    ctx: &RepoContext,
    kind: RefKind,
    rest: String,
) -> Result<Response> {
    let (blob, last_modified) = blob_for_entry(state, ctx, kind, rest).await?;
    serve_blob_or_lfs(state, req, render, &ctx.repo, &blob, last_modified).await
}

/// Download a blob by its SHA-1
pub async fn download_by_id(state: &AppState, req: &HeaderMap, render: bool, ctx: &RepoContext, sha: &str) -> Result<Response> {
    let blob = blob_by_id(ctx, sha).await?;
    serve_blob(&state.settings, req, render, &blob, None).await
}

pub async fn download_by_id_or_lfs(
    state: &AppState,
    req: &HeaderMap,
    render: bool,
    ctx: &RepoContext,
    sha: &str,
) -> Result<Response> {
    let blob = blob_by_id(ctx, sha).await?;
    serve_blob_or_lfs(state, req, render, &ctx.repo, &blob, None).await
}

async fn download(
    state: Arc<AppState>,
    headers: HeaderMap,
    uri: Uri,
    (owner, repo, kind, rest): DownloadPath,
    query: HashMap<String, String>,
    resolve_lfs: bool,
) -> Result<Response> {
    let ctx = match open_repo(&state, &headers, &uri, &owner, &repo).await? {
        Lookup::Found(ctx) => ctx,
        Lookup::Moved(location) => {
            let mut resp = StatusCode::FOUND.into_response();
            set_header(resp.headers_mut(), header::LOCATION, &location);
            return Ok(resp);
        }
    };
    let render = wants_render(&query);

    if kind == "blob" {
        let sha = rest.trim_matches('/');
        return if resolve_lfs {
            download_by_id_or_lfs(&state, &headers, render, &ctx, sha).await
        } else {
            download_by_id(&state, &headers, render, &ctx, sha).await
        };
    }

    let kind = RefKind::parse(&kind).ok_or_else(|| ServerError::NotFound(format!("ref kind {}", kind)))?;
    if resolve_lfs {
        single_download_or_lfs(&state, &headers, render, &ctx, kind, rest).await
    } else {
        single_download(&state, &headers, render, &ctx, kind, rest).await
    }
}

/// `GET /:owner/:repo/raw/{branch,tag,commit}/*rest` and `/raw/blob/:sha`
pub async fn raw(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(path): Path<DownloadPath>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response> {
    download(state, headers, uri, path, query, false).await
}

/// `GET /:owner/:repo/media/...`, resolving LFS pointers
pub async fn media(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Path(path): Path<DownloadPath>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response> {
    download(state, headers, uri, path, query, true).await
}
