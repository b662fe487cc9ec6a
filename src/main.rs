mod auth;
mod avatar;
mod config;
mod db;
mod error;
mod git;
mod httpcache;
mod i18n;
mod lfs;
mod state;
mod storage;
mod typesniffer;
mod web_ui;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Settings;
use state::AppState;

/// Password for the bootstrap admin account; no account is created when unset
const ADMIN_PASSWORD_ENV: &str = "GITFORGE_ADMIN_PASSWORD";
const ADMIN_NAME: &str = "root";

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gitforge_web=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    let data_path = settings.server.data_path.clone();
    tokio::fs::create_dir_all(&data_path).await?;
    tokio::fs::create_dir_all(settings.repo_root()).await?;

    // Initialize database
    let db_path = settings.database_path();
    let db = db::init_database(&db_path).await?;
    tracing::info!("Database initialized at {:?}", db_path);

    if let Ok(password) = std::env::var(ADMIN_PASSWORD_ENV) {
        db::users::ensure_admin_user(&db, ADMIN_NAME, &password).await?;
    }

    let storage = settings.storage.build(&data_path).await?;
    let addr = settings.server.listen_addr;
    let body_limit = settings.avatar.max_file_size as usize + 64 * 1024;
    let state = Arc::new(AppState::new(settings, db, storage));

    let sessions = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(10 * 60));
        loop {
            interval.tick().await;
            let removed = sessions.auth.cleanup_expired();
            if removed > 0 {
                tracing::debug!("Removed {} expired sessions", removed);
            }
        }
    });

    let app = web_ui::router()
        .with_state(state)
        // Multipart avatar uploads are the largest request bodies
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http());

    tracing::info!("gitforge-web starting on http://{}", addr);
    tracing::info!("Settings: http://{}/user/settings", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
