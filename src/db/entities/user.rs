//! User entity. Organizations are users with `is_org` set.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    #[sea_orm(unique)]
    pub lower_name: String,
    pub full_name: String,
    pub email: String,
    pub keep_email_private: bool,
    pub website: String,
    pub location: String,
    pub description: String,
    pub keep_activity_private: bool,
    pub visibility: String, // "public", "limited", "private"
    pub language: String,
    pub theme: String,
    pub avatar: String,
    pub avatar_email: String,
    pub use_custom_avatar: bool,
    pub login_type: String, // "plain", "ldap", "oauth2", ...
    pub is_admin: bool,
    pub is_org: bool,
    pub passwd: String,
    pub salt: String,
    pub created_unix: i64,
    pub updated_unix: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::repository::Entity")]
    Repositories,
    #[sea_orm(has_many = "super::user_setting::Entity")]
    Settings,
}

impl Related<super::repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repositories.def()
    }
}

impl Related<super::user_setting::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Settings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Local accounts sign in with a password stored here
    pub fn is_local(&self) -> bool {
        matches!(self.login_type.as_str(), "" | "plain")
    }
}
