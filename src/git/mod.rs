//! Git object reader for bare repositories on disk.

pub mod commit_info;
pub mod object;
pub mod pack;
pub mod repository;
#[cfg(test)]
pub mod test_support;

use std::sync::Arc;

pub use commit_info::LastCommitCache;
pub use object::{Commit, ObjectId, ObjectType, TreeEntry};
pub use repository::{Blob, RefKind, Repository};

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("does not exist: {0}")]
    NotExist(String),

    #[error("invalid object data: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl GitError {
    pub fn is_not_exist(&self) -> bool {
        matches!(self, GitError::NotExist(_))
    }
}

/// Run blocking repository work on the blocking thread pool
pub async fn blocking<T, F>(repo: &Arc<Repository>, f: F) -> Result<T, GitError>
where
    F: FnOnce(&Repository) -> Result<T, GitError> + Send + 'static,
    T: Send + 'static,
{
    let repo = repo.clone();
    tokio::task::spawn_blocking(move || f(&repo))
        .await
        .map_err(|e| GitError::Task(e.to_string()))?
}
