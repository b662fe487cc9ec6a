//! Shared application state handed to every handler.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;

use crate::auth::AuthManager;
use crate::config::Settings;
use crate::git::LastCommitCache;
use crate::lfs::ContentStore;
use crate::storage::StorageBackend;

pub struct AppState {
    pub settings: Settings,
    pub db: DatabaseConnection,
    /// LFS object bytes
    pub lfs: ContentStore,
    /// Custom avatar images, stored in the `avatars` namespace
    pub avatars: Arc<dyn StorageBackend>,
    pub auth: AuthManager,
    pub last_commit_cache: LastCommitCache,
}

impl AppState {
    pub fn new(settings: Settings, db: DatabaseConnection, storage: Arc<dyn StorageBackend>) -> Self {
        let auth = AuthManager::new(Duration::from_secs(settings.server.session_ttl_secs));
        let last_commit_cache =
            LastCommitCache::new(Duration::from_secs(settings.cache.last_commit_ttl_secs));
        Self {
            lfs: ContentStore::new(storage.clone()),
            avatars: storage,
            auth,
            last_commit_cache,
            db,
            settings,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::LocalStorage;

    /// State over an in-memory database with repositories and storage under `root`
    pub(crate) async fn test_state(root: &std::path::Path) -> Arc<AppState> {
        test_state_with(root, |_| {}).await
    }

    pub(crate) async fn test_state_with(
        root: &std::path::Path,
        configure: impl FnOnce(&mut Settings),
    ) -> Arc<AppState> {
        let mut settings = Settings::default();
        settings.server.data_path = root.to_path_buf();
        settings.repository.root = Some(root.join("repositories"));
        configure(&mut settings);

        let db = crate::db::init_memory_database().await.unwrap();
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(root.join("storage")));
        Arc::new(AppState::new(settings, db, storage))
    }
}
