//! Server settings.
//!
//! Settings are read from an optional TOML file named by `GITFORGE_CONFIG`.
//! Every field has a default, so an empty (or missing) file yields a working
//! development setup. A handful of environment variables override the file.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::storage::StorageConfig;

/// Environment variable naming the TOML settings file
pub const CONFIG_ENV: &str = "GITFORGE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub repository: RepositorySettings,
    pub lfs: LfsSettings,
    pub storage: StorageConfig,
    pub avatar: AvatarSettings,
    pub ui: UiSettings,
    pub i18n: I18nSettings,
    pub service: ServiceSettings,
    pub cache: CacheSettings,
    pub mime_type_map: MimeTypeMapSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Sub-path the forge is mounted under, without a trailing slash (e.g. `/git`)
    pub app_sub_url: String,
    pub listen_addr: SocketAddr,
    pub run_mode: RunMode,
    /// Directory holding the database and local storage
    pub data_path: PathBuf,
    /// Lifetime of a sign-in session in seconds
    pub session_ttl_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            app_sub_url: String::new(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            run_mode: RunMode::Dev,
            data_path: std::env::temp_dir().join("gitforge-data"),
            session_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// Root holding `<owner>/<repo>.git`; defaults to `<data_path>/repositories`
    pub root: Option<PathBuf>,
    pub allow_adoption_of_unadopted_repositories: bool,
    pub allow_delete_of_unadopted_repositories: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LfsSettings {
    pub enabled: bool,
    /// Redirect LFS downloads to a signed storage URL when the backend offers one
    pub serve_direct: bool,
}

impl Default for LfsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            serve_direct: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AvatarSettings {
    pub max_file_size: u64,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for AvatarSettings {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            max_width: 4096,
            max_height: 3072,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub admin_user_paging_num: u64,
    pub themes: Vec<String>,
    pub default_theme: String,
    pub svg_enabled: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            admin_user_paging_num: 50,
            themes: vec!["auto".into(), "gitea".into(), "arc-green".into()],
            default_theme: "auto".into(),
            svg_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct I18nSettings {
    pub langs: Vec<String>,
    pub names: Vec<String>,
}

impl Default for I18nSettings {
    fn default() -> Self {
        Self {
            langs: vec!["en-US".into(), "de-DE".into(), "fr-FR".into(), "zh-CN".into()],
            names: vec![
                "English".into(),
                "Deutsch".into(),
                "Français".into(),
                "简体中文".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Visibility modes users may pick for themselves
    pub allowed_user_visibility_modes: Vec<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            allowed_user_visibility_modes: vec![
                "public".into(),
                "limited".into(),
                "private".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// `max-age` for conditional responses, in seconds
    pub http_max_age_secs: u64,
    pub last_commit_enabled: bool,
    /// Only repositories with at least this many commits on the ref use the cache
    pub last_commit_commits_count: u64,
    pub last_commit_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            http_max_age_secs: 5 * 60,
            last_commit_enabled: true,
            last_commit_commits_count: 1000,
            last_commit_ttl_secs: 8760 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MimeTypeMapSettings {
    pub enabled: bool,
    /// Lower-case extension including the dot (`.md`) to MIME type
    pub map: HashMap<String, String>,
}

impl Settings {
    /// Load settings from `GITFORGE_CONFIG` (if set) and apply env overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        settings.apply_env()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("GITFORGE_DATA_PATH") {
            self.server.data_path = PathBuf::from(path);
        }
        if let Ok(addr) = std::env::var("GITFORGE_ADDR") {
            self.server.listen_addr = addr.parse().map_err(|_| ConfigError::Env {
                key: "GITFORGE_ADDR",
                value: addr.clone(),
            })?;
        }
        if let Ok(mode) = std::env::var("GITFORGE_RUN_MODE") {
            self.server.run_mode = match mode.to_ascii_lowercase().as_str() {
                "prod" => RunMode::Prod,
                "dev" => RunMode::Dev,
                _ => {
                    return Err(ConfigError::Env {
                        key: "GITFORGE_RUN_MODE",
                        value: mode,
                    })
                }
            };
        }
        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.server.run_mode == RunMode::Prod
    }

    /// Prefix an absolute in-app path with the sub-URL
    pub fn app_url(&self, path: &str) -> String {
        format!("{}{}", self.server.app_sub_url.trim_end_matches('/'), path)
    }

    pub fn repo_root(&self) -> PathBuf {
        self.repository
            .root
            .clone()
            .unwrap_or_else(|| self.server.data_path.join("repositories"))
    }

    /// Directory holding the repositories of a user
    pub fn user_path(&self, name: &str) -> PathBuf {
        self.repo_root().join(name.to_lowercase())
    }

    pub fn repo_path(&self, owner: &str, repo: &str) -> PathBuf {
        self.user_path(owner)
            .join(format!("{}.git", repo.to_lowercase()))
    }

    pub fn database_path(&self) -> PathBuf {
        self.server.data_path.join("gitforge.db")
    }

    pub fn is_visibility_allowed(&self, mode: &str) -> bool {
        self.service
            .allowed_user_visibility_modes
            .iter()
            .any(|m| m == mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.ui.admin_user_paging_num, 50);
        assert_eq!(settings.ui.default_theme, "auto");
        assert!(settings.lfs.enabled);
        assert!(!settings.lfs.serve_direct);
        assert!(settings.i18n.langs.contains(&"en-US".to_string()));
    }

    #[test]
    fn test_partial_toml() {
        let settings = Settings::from_toml(
            r#"
            [server]
            app_sub_url = "/git"
            run_mode = "prod"

            [lfs]
            serve_direct = true

            [mime_type_map]
            enabled = true
            map = { ".md" = "text/markdown" }
            "#,
        )
        .unwrap();

        assert!(settings.is_prod());
        assert!(settings.lfs.serve_direct);
        assert!(settings.lfs.enabled);
        assert_eq!(settings.app_url("/user/settings"), "/git/user/settings");
        assert_eq!(
            settings.mime_type_map.map.get(".md").map(String::as_str),
            Some("text/markdown")
        );
    }

    #[test]
    fn test_repo_paths_are_lowercase() {
        let mut settings = Settings::default();
        settings.repository.root = Some(PathBuf::from("/srv/repos"));
        assert_eq!(
            settings.repo_path("Alice", "Demo"),
            PathBuf::from("/srv/repos/alice/demo.git")
        );
    }
}
