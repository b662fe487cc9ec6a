//! Last-commit lookup with an optional TTL cache.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use super::object::ObjectId;
use super::repository::Repository;
use super::GitError;

/// Caches "last commit touching `path` as of `commit`" results.
///
/// Entries are keyed on `sha256("<repo>:<commit>:<path>")` and expire after
/// the configured TTL. History above a given commit never changes, so there
/// is no invalidation beyond expiry.
pub struct LastCommitCache {
    entries: DashMap<String, (ObjectId, i64, Instant)>,
    ttl: Duration,
}

impl LastCommitCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn key(repo_full_name: &str, commit: &ObjectId, path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:{}", repo_full_name, commit, path));
        hex::encode(hasher.finalize())
    }

    /// Cached `(commit id, committer time)`, if present and fresh
    pub fn get(&self, repo_full_name: &str, commit: &ObjectId, path: &str) -> Option<(ObjectId, i64)> {
        let key = Self::key(repo_full_name, commit, path);
        let hit = self.entries.get(&key).map(|e| *e.value());
        match hit {
            Some((id, time, stored)) if stored.elapsed() < self.ttl => Some((id, time)),
            Some(_) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, repo_full_name: &str, commit: &ObjectId, path: &str, last: ObjectId, time: i64) {
        let key = Self::key(repo_full_name, commit, path);
        self.entries.insert(key, (last, time, Instant::now()));
    }

    /// Resolve through the cache, walking history on a miss
    pub fn last_commit_time(
        &self,
        repo: &Repository,
        repo_full_name: &str,
        commit: &ObjectId,
        path: &str,
    ) -> Result<i64, GitError> {
        if let Some((id, time)) = self.get(repo_full_name, commit, path) {
            tracing::trace!("last commit cache hit for {}:{} -> {}", repo_full_name, path, id);
            return Ok(time);
        }
        let last = repo.last_commit_for_path(commit, path)?;
        self.put(repo_full_name, commit, path, last.id, last.committer_time);
        Ok(last.committer_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::object::ObjectType;
    use crate::git::test_support::TestRepo;

    #[test]
    fn test_cache_hit_and_expiry() {
        let a = ObjectId::hash_object(ObjectType::Blob, b"a");
        let b = ObjectId::hash_object(ObjectType::Blob, b"b");

        let cache = LastCommitCache::new(Duration::from_secs(60));
        assert!(cache.get("alice/demo", &a, "README.md").is_none());
        cache.put("alice/demo", &a, "README.md", b, 42);
        assert_eq!(cache.get("alice/demo", &a, "README.md"), Some((b, 42)));
        assert!(cache.get("alice/other", &a, "README.md").is_none());

        let expired = LastCommitCache::new(Duration::ZERO);
        expired.put("alice/demo", &a, "README.md", b, 42);
        assert!(expired.get("alice/demo", &a, "README.md").is_none());
    }

    #[test]
    fn test_last_commit_time_populates_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let t = TestRepo::init(dir.path());
        let blob = t.blob(b"content");
        let c1 = t.commit(t.tree(&[("f", blob, "100644")]), &[], 1_000);
        let c2 = t.commit(t.tree(&[("f", blob, "100644")]), &[c1], 2_000);

        let repo = Repository::open(dir.path()).unwrap();
        let cache = LastCommitCache::new(Duration::from_secs(60));
        assert_eq!(cache.last_commit_time(&repo, "o/r", &c2, "f").unwrap(), 1_000);
        assert_eq!(cache.get("o/r", &c2, "f"), Some((c1, 1_000)));
    }
}
