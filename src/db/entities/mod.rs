//! Database entities

pub mod lfs_meta_object;
pub mod org_member;
pub mod pull_request;
pub mod repository;
pub mod user;
pub mod user_redirect;
pub mod user_setting;

pub use lfs_meta_object::Entity as LfsMetaObject;
pub use org_member::Entity as OrgMember;
pub use pull_request::Entity as PullRequest;
pub use repository::Entity as Repository;
pub use user::Entity as User;
pub use user_redirect::Entity as UserRedirect;
pub use user_setting::Entity as UserSetting;
