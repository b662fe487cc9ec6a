//! Database module for SQLite persistence using SeaORM

pub mod entities;
pub mod lfs;
pub mod orgs;
pub mod pulls;
pub mod repos;
pub mod users;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::path::Path;

/// Current time as unix seconds
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Row offset of a 1-based page, saturating at the largest offset SQLite accepts
pub fn page_offset(page: u64, page_size: u64) -> u64 {
    page.saturating_sub(1)
        .saturating_mul(page_size)
        .min(i64::MAX as u64)
}

/// Initialize database connection and create tables
pub async fn init_database(db_path: &Path) -> Result<DatabaseConnection, DbErr> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    tracing::info!("Connecting to database: {}", db_url);

    let db = Database::connect(&db_url).await?;
    create_tables(&db).await?;
    Ok(db)
}

/// Single-connection in-memory database with the schema applied
pub async fn init_memory_database() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;
    create_tables(&db).await?;
    Ok(db)
}

async fn exec(db: &DatabaseConnection, sql: &str) -> Result<(), DbErr> {
    db.execute(Statement::from_string(db.get_database_backend(), sql.to_string()))
        .await?;
    Ok(())
}

/// Create all tables if they don't exist
async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Users table (also used for organizations with is_org=1)
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            lower_name TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            keep_email_private INTEGER NOT NULL DEFAULT 0,
            website TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            keep_activity_private INTEGER NOT NULL DEFAULT 0,
            visibility TEXT NOT NULL DEFAULT 'public',
            language TEXT NOT NULL DEFAULT '',
            theme TEXT NOT NULL DEFAULT '',
            avatar TEXT NOT NULL DEFAULT '',
            avatar_email TEXT NOT NULL DEFAULT '',
            use_custom_avatar INTEGER NOT NULL DEFAULT 0,
            login_type TEXT NOT NULL DEFAULT 'plain',
            is_admin INTEGER NOT NULL DEFAULT 0,
            is_org INTEGER NOT NULL DEFAULT 0,
            passwd TEXT NOT NULL DEFAULT '',
            salt TEXT NOT NULL DEFAULT '',
            created_unix INTEGER NOT NULL,
            updated_unix INTEGER NOT NULL
        )
        "#,
    )
    .await?;
    exec(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)"#,
    )
    .await?;

    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS user_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            UNIQUE(user_id, setting_key)
        )
        "#,
    )
    .await?;

    // Organization members table (links users to orgs)
    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS org_members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            org_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            role TEXT NOT NULL DEFAULT 'member',
            is_public INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (org_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            UNIQUE(org_id, user_id)
        )
        "#,
    )
    .await?;

    // Create indexes for org member lookups
    exec(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_org_members_org ON org_members(org_id)"#,
    )
    .await?;
    exec(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_org_members_user ON org_members(user_id)"#,
    )
    .await?;

    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            owner_name TEXT NOT NULL,
            name TEXT NOT NULL,
            lower_name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_private INTEGER NOT NULL DEFAULT 0,
            is_fork INTEGER NOT NULL DEFAULT 0,
            fork_id INTEGER,
            created_unix INTEGER NOT NULL,
            updated_unix INTEGER NOT NULL,
            FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
            UNIQUE(owner_id, lower_name)
        )
        "#,
    )
    .await?;
    exec(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_repos_owner ON repositories(owner_id)"#,
    )
    .await?;

    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS lfs_meta_objects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            oid TEXT NOT NULL,
            size INTEGER NOT NULL,
            created_unix INTEGER NOT NULL,
            FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE,
            UNIQUE(repository_id, oid)
        )
        "#,
    )
    .await?;

    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS pull_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            base_repo_id INTEGER NOT NULL,
            poster_id INTEGER NOT NULL,
            head_branch TEXT NOT NULL,
            base_branch TEXT NOT NULL,
            flow INTEGER NOT NULL DEFAULT 0,
            has_merged INTEGER NOT NULL DEFAULT 0,
            created_unix INTEGER NOT NULL
        )
        "#,
    )
    .await?;
    exec(
        db,
        r#"CREATE INDEX IF NOT EXISTS idx_pulls_poster ON pull_requests(poster_id)"#,
    )
    .await?;

    exec(
        db,
        r#"
        CREATE TABLE IF NOT EXISTS user_redirects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lower_name TEXT NOT NULL UNIQUE,
            redirect_user_id INTEGER NOT NULL
        )
        "#,
    )
    .await?;

    tracing::info!("Database tables created/verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 50), 0);
        assert_eq!(page_offset(3, 50), 100);
        assert_eq!(page_offset(0, 50), 0);
        assert_eq!(page_offset(i64::MAX as u64, 50), i64::MAX as u64);
        assert_eq!(page_offset(u64::MAX, u64::MAX), i64::MAX as u64);
    }
}
