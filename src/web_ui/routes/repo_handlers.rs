//! Repositories owned by the signed-in user, including unadopted directories.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::db::entities::repository;
use crate::db::repos::{self, SearchRepoOptions};
use crate::error::{Result, ServerError};
use crate::state::AppState;
use super::utils::{format_relative_time, page_param, require_user, PageContext, Pagination};

#[derive(Serialize)]
struct RepoView {
    name: String,
    full_name: String,
    is_private: bool,
    is_fork: bool,
    base_full_name: Option<String>,
    updated: String,
}

async fn repo_view(state: &AppState, repo: &repository::Model) -> Result<RepoView> {
    let base_full_name = if repo.is_fork {
        repos::get_base_repo(&state.db, repo).await?.map(|base| base.full_name())
    } else {
        None
    };
    Ok(RepoView {
        name: repo.name.clone(),
        full_name: repo.full_name(),
        is_private: repo.is_private,
        is_fork: repo.is_fork,
        base_full_name,
        updated: format_relative_time(repo.updated_unix),
    })
}

/// Names of `*.git` directories directly under `root` whose stem is a usable
/// lower-case repository name, restricted to `[start, end)`, plus their total count
pub fn scan_repo_dirs(root: &Path, start: u64, end: u64) -> std::io::Result<(Vec<String>, u64)> {
    let mut names = Vec::new();
    let mut count = 0u64;

    let walker = WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.io_error().is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound) {
                    continue;
                }
                return Err(e.into());
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(stem) = name.strip_suffix(".git") else {
            continue;
        };
        if repos::is_usable_repo_name(stem).is_err() || stem.to_lowercase() != stem {
            continue;
        }
        if count >= start && count < end {
            names.push(stem.to_string());
        }
        count += 1;
    }
    Ok((names, count))
}

async fn render_repos(state: &AppState, headers: &HeaderMap, query: &HashMap<String, String>) -> Result<Response> {
    let current = match require_user(state, headers).await {
        Ok(current) => current,
        Err(redirect) => return Ok(redirect),
    };
    let settings = &state.settings;
    let is_admin = current.user.is_admin;
    let allow_adopt = is_admin || settings.repository.allow_adoption_of_unadopted_repositories;
    let allow_delete = is_admin || settings.repository.allow_delete_of_unadopted_repositories;
    let adopt_or_delete = is_admin
        || (settings.repository.allow_adoption_of_unadopted_repositories
            && settings.repository.allow_delete_of_unadopted_repositories);

    let page_size = settings.ui.admin_user_paging_num;
    let current_page = page_param(query);
    let start = crate::db::page_offset(current_page, page_size);
    let end = start.saturating_add(page_size);

    let mut page = PageContext::new(state, headers, Some(&current));
    let count = if adopt_or_delete {
        let root = settings.user_path(&current.user.name);
        let (dirs, count) = tokio::task::spawn_blocking(move || scan_repo_dirs(&root, start, end))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))??;

        let (found, _) = repos::get_user_repositories(
            &state.db,
            &SearchRepoOptions {
                owner_id: current.user.id,
                page: 1,
                page_size,
                include_private: true,
                lower_names: Some(dirs.clone()),
            },
        )
        .await?;
        let mut repos_map = HashMap::new();
        for repo in &found {
            repos_map.insert(repo.lower_name.clone(), repo_view(state, repo).await?);
        }
        page.insert("dirs", &dirs);
        page.insert("repos_map", &repos_map);
        count
    } else {
        let (found, count) = repos::get_user_repositories(
            &state.db,
            &SearchRepoOptions {
                owner_id: current.user.id,
                page: current_page,
                page_size,
                include_private: true,
                lower_names: None,
            },
        )
        .await?;
        let mut views = Vec::with_capacity(found.len());
        for repo in &found {
            views.push(repo_view(state, repo).await?);
        }
        page.insert("repos", &views);
        count
    };

    page.insert("page_is_settings_repos", &true);
    page.insert("allow_adopt", &allow_adopt);
    page.insert("allow_delete", &allow_delete);
    page.insert("adopt_or_delete", &adopt_or_delete);
    page.insert("owner", &current.user.name);
    page.insert("page", &Pagination::new(count, page_size, current_page, 5));
    Ok(page.render("user/settings/repos.html"))
}

/// Repository list (GET /user/settings/repos)
pub async fn repos_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    render_repos(&state, &headers, &query)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}
