use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use panel_core::{FeedbackStore, PanelConfig, SqliteSheet, FEEDBACK_WORKSHEET};
use panel_server::auth::CookieSigner;
use panel_server::config::{Config, REVOKED_SESSIONS_WORKSHEET};
use panel_server::revocation::RevokedSessions;
use panel_server::{app_router, get_app_version, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting interview panel {}", get_app_version());

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let panel = PanelConfig::load(&config.panel_config).with_context(|| {
        format!(
            "Failed to load panel file {}",
            config.panel_config.display()
        )
    })?;
    info!(
        "Loaded panel: {} candidates, {} criteria, {} accounts",
        panel.candidates.len(),
        panel.criteria.len(),
        panel.credentials.len()
    );

    let db_path = config.store_path();
    info!("Using feedback store: {}", db_path.display());
    let sheet = SqliteSheet::open(&db_path, FEEDBACK_WORKSHEET)
        .context("Failed to open SQLite feedback store")?;
    let store = FeedbackStore::new(Arc::new(sheet), panel.criterion_names())
        .with_retry_policy(config.retry_policy());

    let revoked_sheet = SqliteSheet::open(&db_path, REVOKED_SESSIONS_WORKSHEET)
        .context("Failed to open revoked sessions table")?;
    let revoked = RevokedSessions::load(Arc::new(revoked_sheet), chrono::Utc::now().timestamp())
        .await
        .context("Failed to read revoked sessions")?;

    let signer = CookieSigner::new(&config.cookie_key)
        .map_err(|e| anyhow::anyhow!("Invalid COOKIE_KEY: {}", e))?;

    if config.conflict_detection {
        info!("Conflict detection enabled");
    }

    let state = Arc::new(AppState::new(
        panel,
        store,
        revoked,
        signer,
        config.conflict_detection,
    ));
    let app = app_router(state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
