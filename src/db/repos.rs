//! Repository queries

use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select,
};

use super::entities::{repository, user};
use super::orgs;
use super::users::{self, UserError};

const RESERVED_REPO_NAMES: &[&str] = &[".", "..", "-"];
const RESERVED_REPO_PATTERNS: &[&str] = &["*.git", "*.wiki", "*.rss", "*.atom"];

/// Same character rules as user names, with repository reserved names
pub fn is_usable_repo_name(name: &str) -> Result<(), UserError> {
    if !users::has_valid_name_chars(name) {
        return Err(UserError::NameCharsNotAllowed(name.to_string()));
    }
    users::is_usable_name(RESERVED_REPO_NAMES, RESERVED_REPO_PATTERNS, name)
}

pub struct SearchRepoOptions {
    pub owner_id: i64,
    /// 1-based page; 0 disables paging
    pub page: u64,
    pub page_size: u64,
    pub include_private: bool,
    /// Restrict to these lower-case names
    pub lower_names: Option<Vec<String>>,
}

fn search_query(opts: &SearchRepoOptions) -> Select<repository::Entity> {
    let mut query = repository::Entity::find().filter(repository::Column::OwnerId.eq(opts.owner_id));
    if !opts.include_private {
        query = query.filter(repository::Column::IsPrivate.eq(false));
    }
    if let Some(names) = &opts.lower_names {
        query = query.filter(repository::Column::LowerName.is_in(names.iter().cloned()));
    }
    query
}

/// One page of the owner's repositories, most recently updated first, plus the total count
pub async fn get_user_repositories(
    db: &impl ConnectionTrait,
    opts: &SearchRepoOptions,
) -> Result<(Vec<repository::Model>, u64), DbErr> {
    let count = search_query(opts).count(db).await?;

    let mut query = search_query(opts)
        .order_by_desc(repository::Column::UpdatedUnix)
        .order_by_asc(repository::Column::Id);
    if opts.page > 0 && opts.page_size > 0 {
        query = query
            .offset(super::page_offset(opts.page, opts.page_size))
            .limit(opts.page_size);
    }
    Ok((query.all(db).await?, count))
}

pub async fn get_repository_by_name(
    db: &impl ConnectionTrait,
    owner_id: i64,
    name: &str,
) -> Result<Option<repository::Model>, DbErr> {
    repository::Entity::find()
        .filter(repository::Column::OwnerId.eq(owner_id))
        .filter(repository::Column::LowerName.eq(name.to_lowercase()))
        .one(db)
        .await
}

/// Repository a fork was created from, if it still exists
pub async fn get_base_repo(
    db: &impl ConnectionTrait,
    repo: &repository::Model,
) -> Result<Option<repository::Model>, DbErr> {
    match (repo.is_fork, repo.fork_id) {
        (true, Some(id)) => repository::Entity::find_by_id(id).one(db).await,
        _ => Ok(None),
    }
}

/// Private repositories are readable by their owner, site admins and
/// members of the owning organization
pub async fn can_read(
    db: &impl ConnectionTrait,
    repo: &repository::Model,
    owner: &user::Model,
    viewer: Option<&user::Model>,
) -> Result<bool, DbErr> {
    if !repo.is_private {
        return Ok(true);
    }
    let Some(viewer) = viewer else {
        return Ok(false);
    };
    if viewer.is_admin || viewer.id == repo.owner_id {
        return Ok(true);
    }
    if owner.is_org {
        return orgs::is_org_member(db, owner.id, viewer.id).await;
    }
    Ok(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::db::orgs::tests::{add_member, create_org};
    use crate::db::users::{create_user, NewUser};
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

    pub(crate) async fn insert_repo(
        db: &DatabaseConnection,
        owner: &user::Model,
        name: &str,
        is_private: bool,
    ) -> repository::Model {
        insert_repo_at(db, owner, name, is_private, 0, None).await
    }

    pub(crate) async fn insert_repo_at(
        db: &DatabaseConnection,
        owner: &user::Model,
        name: &str,
        is_private: bool,
        updated_unix: i64,
        fork_of: Option<i64>,
    ) -> repository::Model {
        repository::ActiveModel {
            owner_id: Set(owner.id),
            owner_name: Set(owner.name.clone()),
            name: Set(name.to_string()),
            lower_name: Set(name.to_lowercase()),
            description: Set(String::new()),
            is_private: Set(is_private),
            is_fork: Set(fork_of.is_some()),
            fork_id: Set(fork_of),
            created_unix: Set(0),
            updated_unix: Set(updated_unix),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[test]
    fn test_repo_name_rules() {
        assert!(is_usable_repo_name("demo").is_ok());
        assert!(is_usable_repo_name("my-repo.v2").is_ok());
        assert!(matches!(is_usable_repo_name("-"), Err(UserError::NameReserved(_))));
        assert!(matches!(
            is_usable_repo_name("demo.wiki"),
            Err(UserError::NamePatternNotAllowed(_))
        ));
        assert!(is_usable_repo_name("a/b").is_err());
        assert!(is_usable_repo_name("").is_err());
    }

    #[tokio::test]
    async fn test_user_repositories_paging_and_forks() {
        let db = init_memory_database().await.unwrap();
        let alice = create_user(&db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let bob = create_user(&db, NewUser::local("bob", "bob@example.com", "pw"))
            .await
            .unwrap();

        let upstream = insert_repo_at(&db, &bob, "upstream", false, 5, None).await;
        insert_repo_at(&db, &alice, "old", false, 10, None).await;
        insert_repo_at(&db, &alice, "secret", true, 30, None).await;
        let fork = insert_repo_at(&db, &alice, "fork", false, 20, Some(upstream.id)).await;

        let mut opts = SearchRepoOptions {
            owner_id: alice.id,
            page: 1,
            page_size: 2,
            include_private: true,
            lower_names: None,
        };
        let (repos, count) = get_user_repositories(&db, &opts).await.unwrap();
        assert_eq!(count, 3);
        let names: Vec<&str> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["secret", "fork"]);

        opts.include_private = false;
        opts.page = 0;
        opts.lower_names = Some(vec!["old".to_string(), "secret".to_string()]);
        let (repos, count) = get_user_repositories(&db, &opts).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(repos[0].name, "old");

        let base = get_base_repo(&db, &fork).await.unwrap().unwrap();
        assert_eq!(base.full_name(), "bob/upstream");
        assert!(get_base_repo(&db, &upstream).await.unwrap().is_none());

        let found = get_repository_by_name(&db, alice.id, "FORK").await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(fork.id));
    }

    #[tokio::test]
    async fn test_private_read_access() {
        let db = init_memory_database().await.unwrap();
        let alice = create_user(&db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let bob = create_user(&db, NewUser::local("bob", "bob@example.com", "pw"))
            .await
            .unwrap();
        let mut admin = NewUser::local("root", "root@example.com", "pw");
        admin.is_admin = true;
        let admin = create_user(&db, admin).await.unwrap();
        let org = create_org(&db, "acme", "public").await;
        add_member(&db, org.id, bob.id, false).await;

        let private = insert_repo(&db, &alice, "private", true).await;
        let public = insert_repo(&db, &alice, "public", false).await;
        let org_repo = insert_repo(&db, &org, "internal", true).await;

        assert!(can_read(&db, &public, &alice, None).await.unwrap());
        assert!(!can_read(&db, &private, &alice, None).await.unwrap());
        assert!(can_read(&db, &private, &alice, Some(&alice)).await.unwrap());
        assert!(!can_read(&db, &private, &alice, Some(&bob)).await.unwrap());
        assert!(can_read(&db, &private, &alice, Some(&admin)).await.unwrap());
        assert!(can_read(&db, &org_repo, &org, Some(&bob)).await.unwrap());
        assert!(!can_read(&db, &org_repo, &org, Some(&alice)).await.unwrap());
    }
}
