//! Organization membership queries

use sea_orm::sea_query::Query;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

use super::entities::{org_member, user};

pub struct FindOrgOptions {
    /// 1-based page; 0 disables paging
    pub page: u64,
    pub page_size: u64,
    pub user_id: i64,
    /// Include private memberships and non-public organizations
    pub include_private: bool,
}

fn org_condition(opts: &FindOrgOptions) -> Condition {
    let mut member_ids = Query::select();
    member_ids
        .column(org_member::Column::OrgId)
        .from(org_member::Entity)
        .and_where(org_member::Column::UserId.eq(opts.user_id));
    if !opts.include_private {
        member_ids.and_where(org_member::Column::IsPublic.eq(true));
    }

    let mut cond = Condition::all()
        .add(user::Column::IsOrg.eq(true))
        .add(user::Column::Id.in_subquery(member_ids));
    if !opts.include_private {
        cond = cond.add(user::Column::Visibility.eq("public"));
    }
    cond
}

/// Organizations the user belongs to, ordered by name
pub async fn find_orgs(db: &impl ConnectionTrait, opts: &FindOrgOptions) -> Result<Vec<user::Model>, DbErr> {
    let mut query = user::Entity::find()
        .filter(org_condition(opts))
        .order_by_asc(user::Column::LowerName);
    if opts.page > 0 && opts.page_size > 0 {
        query = query
            .offset(super::page_offset(opts.page, opts.page_size))
            .limit(opts.page_size);
    }
    query.all(db).await
}

pub async fn count_orgs(db: &impl ConnectionTrait, opts: &FindOrgOptions) -> Result<u64, DbErr> {
    user::Entity::find().filter(org_condition(opts)).count(db).await
}

/// Whether `user_id` is a member of organization `org_id`
pub async fn is_org_member(db: &impl ConnectionTrait, org_id: i64, user_id: i64) -> Result<bool, DbErr> {
    let count = org_member::Entity::find()
        .filter(org_member::Column::OrgId.eq(org_id))
        .filter(org_member::Column::UserId.eq(user_id))
        .count(db)
        .await?;
    Ok(count > 0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::db::users::{create_user, NewUser};
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

    pub(crate) async fn create_org(db: &DatabaseConnection, name: &str, visibility: &str) -> user::Model {
        let mut new = NewUser::local(name, "", "");
        new.is_org = true;
        let org = create_user(db, new).await.unwrap();
        let mut active: user::ActiveModel = org.into();
        active.visibility = Set(visibility.to_string());
        active.update(db).await.unwrap()
    }

    pub(crate) async fn add_member(db: &DatabaseConnection, org_id: i64, user_id: i64, is_public: bool) {
        org_member::ActiveModel {
            org_id: Set(org_id),
            user_id: Set(user_id),
            role: Set("member".to_string()),
            is_public: Set(is_public),
            created_at: Set(0),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_find_orgs_visibility_and_paging() {
        let db = init_memory_database().await.unwrap();
        let alice = create_user(&db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let zeta = create_org(&db, "zeta", "public").await;
        let beta = create_org(&db, "beta", "private").await;
        let acme = create_org(&db, "Acme", "public").await;
        create_org(&db, "other", "public").await;

        add_member(&db, zeta.id, alice.id, true).await;
        add_member(&db, beta.id, alice.id, true).await;
        add_member(&db, acme.id, alice.id, false).await;

        let mut opts = FindOrgOptions {
            page: 1,
            page_size: 2,
            user_id: alice.id,
            include_private: true,
        };
        let names: Vec<String> = find_orgs(&db, &opts).await.unwrap().into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["Acme", "beta"]);
        assert_eq!(count_orgs(&db, &opts).await.unwrap(), 3);

        opts.page = 2;
        let names: Vec<String> = find_orgs(&db, &opts).await.unwrap().into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["zeta"]);

        // anonymous view: public membership of a public org only
        opts.page = 1;
        opts.include_private = false;
        let names: Vec<String> = find_orgs(&db, &opts).await.unwrap().into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["zeta"]);
        assert_eq!(count_orgs(&db, &opts).await.unwrap(), 1);

        assert!(is_org_member(&db, beta.id, alice.id).await.unwrap());
        assert!(!is_org_member(&db, beta.id, alice.id + 100).await.unwrap());
    }
}
