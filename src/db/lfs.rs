//! LFS meta object queries

use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use super::entities::lfs_meta_object;
use super::now_unix;

pub async fn get_lfs_meta_object_by_oid(
    db: &impl ConnectionTrait,
    repository_id: i64,
    oid: &str,
) -> Result<Option<lfs_meta_object::Model>, DbErr> {
    lfs_meta_object::Entity::find()
        .filter(lfs_meta_object::Column::RepositoryId.eq(repository_id))
        .filter(lfs_meta_object::Column::Oid.eq(oid))
        .one(db)
        .await
}

/// Record that `repository_id` references the object; existing records are returned unchanged
pub async fn new_lfs_meta_object(
    db: &impl ConnectionTrait,
    repository_id: i64,
    oid: &str,
    size: i64,
) -> Result<lfs_meta_object::Model, DbErr> {
    if let Some(existing) = get_lfs_meta_object_by_oid(db, repository_id, oid).await? {
        return Ok(existing);
    }
    lfs_meta_object::ActiveModel {
        repository_id: Set(repository_id),
        oid: Set(oid.to_string()),
        size: Set(size),
        created_unix: Set(now_unix()),
        ..Default::default()
    }
    .insert(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::db::repos::tests::insert_repo;
    use crate::db::users::{create_user, NewUser};

    #[tokio::test]
    async fn test_meta_objects_are_per_repository() {
        let db = init_memory_database().await.unwrap();
        let alice = create_user(&db, NewUser::local("alice", "alice@example.com", "pw"))
            .await
            .unwrap();
        let one = insert_repo(&db, &alice, "one", false).await;
        let two = insert_repo(&db, &alice, "two", false).await;
        let oid = "a".repeat(64);

        let first = new_lfs_meta_object(&db, one.id, &oid, 42).await.unwrap();
        let again = new_lfs_meta_object(&db, one.id, &oid, 42).await.unwrap();
        assert_eq!(first.id, again.id);

        let found = get_lfs_meta_object_by_oid(&db, one.id, &oid).await.unwrap().unwrap();
        assert_eq!(found.size, 42);
        assert!(get_lfs_meta_object_by_oid(&db, two.id, &oid).await.unwrap().is_none());
    }
}
