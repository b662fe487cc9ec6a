//! Pull request bookkeeping that follows user renames.

use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use super::entities::{pull_request, user};

/// Rewrite head branches of the user's unmerged agit pull requests.
///
/// Agit heads are named `<lower user name>/<topic>`; the old prefix is
/// replaced with `new_name`.
pub async fn user_name_changed(
    db: &impl ConnectionTrait,
    u: &user::Model,
    new_name: &str,
) -> Result<(), DbErr> {
    let pulls = pull_request::Entity::find()
        .filter(pull_request::Column::PosterId.eq(u.id))
        .filter(pull_request::Column::Flow.eq(pull_request::FLOW_AGIT))
        .filter(pull_request::Column::HasMerged.eq(false))
        .all(db)
        .await?;

    let prefix = format!("{}/", u.lower_name);
    for pull in pulls {
        let topic = pull
            .head_branch
            .strip_prefix(&prefix)
            .unwrap_or(&pull.head_branch)
            .to_string();
        let mut active: pull_request::ActiveModel = pull.into();
        active.head_branch = Set(format!("{}/{}", new_name, topic));
        active.update(db).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::db::users::{create_user, NewUser};

    async fn insert_pull(db: &impl ConnectionTrait, poster: i64, head: &str, flow: i32, merged: bool) {
        pull_request::ActiveModel {
            base_repo_id: Set(1),
            poster_id: Set(poster),
            head_branch: Set(head.to_string()),
            base_branch: Set("main".to_string()),
            flow: Set(flow),
            has_merged: Set(merged),
            created_unix: Set(0),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_only_open_agit_heads_are_rewritten() {
        let db = init_memory_database().await.unwrap();
        let alice = create_user(&db, NewUser::local("Alice", "alice@example.com", "pw"))
            .await
            .unwrap();

        insert_pull(&db, alice.id, "alice/fix", pull_request::FLOW_AGIT, false).await;
        insert_pull(&db, alice.id, "alice/old", pull_request::FLOW_AGIT, true).await;
        insert_pull(&db, alice.id, "feature", 0, false).await;

        user_name_changed(&db, &alice, "ally").await.unwrap();

        let heads: Vec<String> = pull_request::Entity::find()
            .all(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.head_branch)
            .collect();
        assert_eq!(heads, vec!["ally/fix", "alice/old", "feature"]);
    }
}
