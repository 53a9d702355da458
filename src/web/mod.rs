//! Web server module

mod admin;
mod analytics;
mod middleware;
mod routes;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

use crate::auth::TokenService;
use crate::config::Config;
use crate::db::{Database, WriteSender};
use crate::notes::NoteStore;

pub struct AppState {
    pub notes: Arc<NoteStore>,
    pub tokens: TokenService,
    pub db: Database,
    pub write_tx: WriteSender,
}

impl AppState {
    pub fn new(config: &Config, db: Database, write_tx: WriteSender) -> Self {
        Self {
            notes: Arc::new(NoteStore::new(&config.notes)),
            tokens: TokenService::new(&config.auth),
            db,
            write_tx,
        }
    }
}

/// Success envelope shared by the JSON endpoints
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data, message: None }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self { success: true, data, message: Some(message.into()) }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    // Leave headroom so oversize files reach our own size check
    let upload_limit = usize::try_from(state.notes.max_upload_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(1024 * 1024);

    let admin = Router::new()
        .route(
            "/api/admin/notes/upload",
            post(admin::upload_note)
                .layer(DefaultBodyLimit::max(upload_limit))
                .delete(admin::delete_reserved_note),
        )
        // Fixed action paths shadow the wildcard, so they take DELETE too
        .route(
            "/api/admin/notes/mkdir",
            post(admin::not_implemented).delete(admin::delete_reserved_note),
        )
        .route(
            "/api/admin/notes/move",
            put(admin::not_implemented).delete(admin::delete_reserved_note),
        )
        .route("/api/admin/notes/*path", delete(admin::delete_note))
        .route("/api/admin/analytics/logs", get(analytics::logs))
        .route("/api/admin/analytics/overview", get(analytics::overview))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), admin::require_admin));

    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/api/notes", get(routes::note_tree))
        .route("/api/notes/search", get(routes::search_notes))
        .route("/api/notes/*path", get(routes::note_content))
        .route("/api/admin/login", post(admin::login))
        .route("/api/admin/verify", get(admin::verify))
        .merge(admin)
        .layer(middleware::RequestLoggingLayer::new(state.write_tx.clone()))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_allows_any() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub async fn start_server(config: &Config, state: Arc<AppState>) -> Result<()> {
    let app = router(state).layer(cors_layer(config));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
