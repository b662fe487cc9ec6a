//! Organizations the signed-in user belongs to.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::orgs::{self, FindOrgOptions};
use crate::error::ServerError;
use crate::state::AppState;
use super::avatar_handlers::avatar_link;
use super::utils::{page_param, require_user, PageContext, Pagination};

#[derive(Serialize)]
struct OrgView {
    name: String,
    full_name: String,
    visibility: String,
    avatar_link: String,
}

/// Organization list (GET /user/settings/organization)
pub async fn organization_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let current = match require_user(&state, &headers).await {
        Ok(current) => current,
        Err(redirect) => return redirect,
    };

    let opts = FindOrgOptions {
        page: page_param(&query),
        page_size: state.settings.ui.admin_user_paging_num,
        user_id: current.user.id,
        include_private: true,
    };

    let orgs = match orgs::find_orgs(&state.db, &opts).await {
        Ok(orgs) => orgs,
        Err(e) => return ServerError::from(e).into_response(),
    };
    let total = match orgs::count_orgs(&state.db, &opts).await {
        Ok(total) => total,
        Err(e) => return ServerError::from(e).into_response(),
    };

    let views: Vec<OrgView> = orgs
        .iter()
        .map(|org| OrgView {
            name: org.name.clone(),
            full_name: org.full_name.clone(),
            visibility: org.visibility.clone(),
            avatar_link: avatar_link(&state.settings, org),
        })
        .collect();

    let mut page = PageContext::new(&state, &headers, Some(&current));
    page.insert("page_is_settings_organization", &true);
    page.insert("orgs", &views);
    page.insert("page", &Pagination::new(total, opts.page_size, opts.page, 5));
    page.render("user/settings/organization.html")
}

#[cfg(test)]
mod tests {
    use crate::db::orgs::tests::{add_member, create_org};
    use crate::db::users::{create_user, NewUser};
    use crate::state::tests::test_state_with;
    use crate::web_ui::routes::test_support::{body_string, send_get, signed_in};
    use axum::http::StatusCode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lists_memberships_including_private_ones() {
        let dir = TempDir::new().unwrap();
        let state = test_state_with(dir.path(), |s| s.ui.admin_user_paging_num = 2).await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let zeta = create_org(&state.db, "zetaorg", "public").await;
        let acme = create_org(&state.db, "acmeorg", "private").await;
        let beta = create_org(&state.db, "betaorg", "limited").await;
        create_org(&state.db, "outsiderorg", "public").await;
        add_member(&state.db, zeta.id, alice.id, true).await;
        add_member(&state.db, acme.id, alice.id, false).await;
        add_member(&state.db, beta.id, alice.id, false).await;
        let (cookie, _) = signed_in(&state, &alice);

        let html = body_string(send_get(&state, "/user/settings/organization", Some(&cookie)).await).await;
        assert!(html.contains("acmeorg"));
        assert!(html.contains("betaorg"));
        assert!(!html.contains("zetaorg"));
        assert!(!html.contains("outsiderorg"));

        for page in ["2", "0", "-3", "x"] {
            let resp = send_get(&state, &format!("/user/settings/organization?page={}", page), Some(&cookie)).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let html = body_string(resp).await;
            if page == "2" {
                assert!(html.contains("zetaorg"));
                assert!(!html.contains("acmeorg"));
            } else {
                assert!(html.contains("acmeorg"));
            }
        }
    }

    #[tokio::test]
    async fn test_huge_page_number_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let state = test_state_with(dir.path(), |s| s.ui.admin_user_paging_num = 2).await;
        let alice = create_user(&state.db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let acme = create_org(&state.db, "acmeorg", "public").await;
        add_member(&state.db, acme.id, alice.id, true).await;
        let (cookie, _) = signed_in(&state, &alice);

        let resp = send_get(
            &state,
            &format!("/user/settings/organization?page={}", i64::MAX),
            Some(&cookie),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!body_string(resp).await.contains("acmeorg"));
    }
}
