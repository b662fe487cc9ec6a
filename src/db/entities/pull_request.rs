//! Pull request entity

use sea_orm::entity::prelude::*;

/// Pull requests opened by pushing to `refs/for/<branch>/<topic>`
pub const FLOW_AGIT: i32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pull_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub base_repo_id: i64,
    pub poster_id: i64,
    pub head_branch: String,
    pub base_branch: String,
    pub flow: i32, // 0 = branch, 1 = agit
    pub has_merged: bool,
    pub created_unix: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::PosterId",
        to = "super::user::Column::Id"
    )]
    Poster,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Poster.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
