//! Public note routes plus service banner and health check

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiResponse, AppState};
use crate::error::{ApiError, ApiResult};
use crate::notes::{NoteNode, SearchHit};

const SERVICE_NAME: &str = "mdnotes";

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub message: &'static str,
    pub notes_dir: String,
    pub timestamp: i64,
}

/// Service banner
pub async fn index(State(state): State<Arc<AppState>>) -> Json<IndexResponse> {
    Json(IndexResponse {
        message: "Markdown notes API",
        notes_dir: state.notes.root().display().to_string(),
        timestamp: Utc::now().timestamp(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub notes_dir_accessible: bool,
    pub database_accessible: bool,
    pub timestamp: i64,
}

/// Health check: unhealthy when the notes directory is missing
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let notes_dir_accessible = state.notes.is_accessible();
    let database_accessible = state.db.ping().await;

    let (status_code, status) = if notes_dir_accessible {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "error")
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            service: SERVICE_NAME,
            notes_dir_accessible,
            database_accessible,
            timestamp: Utc::now().timestamp(),
        }),
    )
}

/// API: note tree
pub async fn note_tree(State(state): State<Arc<AppState>>) -> ApiResult<Json<ApiResponse<Vec<NoteNode>>>> {
    let notes = state.notes.clone();
    let tree = tokio::task::spawn_blocking(move || notes.tree()).await?;
    Ok(Json(ApiResponse::ok(tree)))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<SearchHit>,
    pub total: usize,
}

/// API: keyword search over note names and contents
pub async fn search_notes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let keyword = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("search keyword is required".to_string()))?;

    let notes = state.notes.clone();
    let hits = tokio::task::spawn_blocking(move || notes.search(&keyword)).await?;

    Ok(Json(SearchResponse {
        success: true,
        total: hits.len(),
        data: hits,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NoteContent {
    pub path: String,
    pub content: String,
}

/// API: raw note text. `?path=` takes precedence over the URL path.
pub async fn note_content(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<ContentQuery>,
) -> ApiResult<Json<ApiResponse<NoteContent>>> {
    let path = query.path.filter(|p| !p.is_empty()).unwrap_or(path);

    let notes = state.notes.clone();
    let lookup = path.clone();
    let content = tokio::task::spawn_blocking(move || notes.content(&lookup)).await??;

    Ok(Json(ApiResponse::ok(NoteContent { path, content })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_app;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn tree_lists_notes() {
        let app = test_app().await;
        let (status, json) = app.get("/api/notes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"][0]["type"], "directory");
        assert_eq!(json["data"][0]["children"][0]["path"], "guides/rust.md");
        assert_eq!(json["data"][1]["name"], "intro");
    }

    #[tokio::test]
    async fn search_requires_keyword() {
        let app = test_app().await;
        let (status, json) = app.get("/api/notes/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);

        let (status, _) = app.get("/api/notes/search?q=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_returns_hits_with_total() {
        let app = test_app().await;
        let (status, json) = app.get("/api/notes/search?q=borrowing").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 1);
        assert_eq!(json["data"][0]["path"], "guides/rust.md");
        assert_eq!(json["data"][0]["context"], "# Rust\nOwnership and borrowing");
    }

    #[tokio::test]
    async fn content_by_path_and_query() {
        let app = test_app().await;
        let (status, json) = app.get("/api/notes/guides/rust.md").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["content"], "# Rust\nOwnership and borrowing");

        let (status, json) = app.get("/api/notes/x?path=intro.md").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["path"], "intro.md");
    }

    #[tokio::test]
    async fn content_missing_or_outside_root_is_404() {
        let app = test_app().await;
        let (status, _) = app.get("/api/notes/missing.md").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.get("/api/notes/x?path=../../etc/passwd").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_notes_dir() {
        let app = test_app().await;
        let (status, json) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["notes_dir_accessible"], true);
        assert_eq!(json["status"], "ok");

        std::fs::remove_dir_all(app.notes_dir.path()).unwrap();
        let (status, json) = app.get("/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "error");
    }
}
