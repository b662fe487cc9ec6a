use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::users::UserError;
use crate::git::GitError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("User error: {0}")]
    User(#[from] UserError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::RepoNotFound(_) | ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Git(e) if e.is_not_exist() => StatusCode::NOT_FOUND,
            ServerError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::User(UserError::NotExist(_)) => StatusCode::NOT_FOUND,
            ServerError::User(UserError::AlreadyExist(_) | UserError::EmailAlreadyUsed(_)) => {
                StatusCode::CONFLICT
            }
            ServerError::User(
                UserError::NameReserved(_)
                | UserError::NamePatternNotAllowed(_)
                | UserError::NameCharsNotAllowed(_)
                | UserError::NotLocal(_)
                | UserError::InvalidSetting(_),
            ) => StatusCode::BAD_REQUEST,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::AuthRequired => StatusCode::UNAUTHORIZED,
            ServerError::PermissionDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        crate::web_ui::error_page(status, &message)
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::User(UserError::NotExist("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::User(UserError::AlreadyExist("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServerError::User(UserError::NameReserved("api".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Git(GitError::NotExist("path".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Git(GitError::Invalid("bad".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
