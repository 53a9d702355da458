//! mdnotes - Markdown notes server with admin analytics
//!
//! Serves a directory of markdown notes as a JSON API:
//! - Note tree, content and keyword search
//! - Token-protected upload and delete
//! - Access logging with visit statistics

mod auth;
mod config;
mod db;
mod error;
mod notes;
mod user_agent;
mod web;

use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// How long to wait for queued access logs after the server stops
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = config::Config::load()?;

    // Initialize logging based on LOG_FORMAT env var
    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting mdnotes...");
    info!("Configuration loaded: {:?}", config);

    let defaults = config::AuthConfig::default();
    if config.auth.admin_password == defaults.admin_password || config.auth.jwt_secret == defaults.jwt_secret {
        warn!("Default admin password or JWT secret in use; set ADMIN_PASSWORD and JWT_SECRET_KEY");
    }

    if !config.notes.dir.is_dir() {
        warn!("Notes directory {} does not exist", config.notes.dir.display());
    }

    // Initialize database
    let db = db::Database::new(&config.database).await?;
    db.run_migrations().await?;
    info!("Database initialized ({} access log entries)", db.get_total_count().await?);

    // Access logs are written in batches off the request path
    let (write_tx, writer) = db::start_write_buffer(Arc::new(db.clone()), &config.access_log);

    let state = Arc::new(web::AppState::new(&config, db, write_tx));

    // Start web server (blocking until shutdown)
    web::start_server(&config, state).await?;

    // Every sender is gone with the router; wait for the writer to flush
    match tokio::time::timeout(DRAIN_TIMEOUT, writer).await {
        Ok(Ok(())) => info!("Access log writer drained"),
        Ok(Err(e)) => warn!("Access log writer failed: {}", e),
        Err(_) => warn!("Timed out draining access logs"),
    }

    Ok(())
}
