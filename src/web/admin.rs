//! Admin routes: login, token check and note file management

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Request, State},
    http::{header, HeaderMap, StatusCode, Uri},
    middleware::Next,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{ApiResponse, AppState};
use crate::auth::Claims;
use crate::error::{ApiError, ApiResult};
use crate::notes::{NoteError, UploadedNote};

/// Reject requests without a valid admin bearer token
pub async fn require_admin(State(state): State<Arc<AppState>>, request: Request, next: Next) -> ApiResult<Response> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    state.tokens.authorize(authorization)?;
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenData {
    pub token: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<TokenData>>> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(format!("invalid login request: {}", e.body_text())))?;

    let result = state.tokens.authenticate(&request.password);
    match result.token {
        Some(token) if result.success => {
            info!("Admin login succeeded");
            Ok(Json(ApiResponse::with_message(TokenData { token }, result.message)))
        }
        _ => {
            info!("Admin login rejected");
            Err(ApiError::Unauthorized(result.message))
        }
    }
}

pub async fn verify(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<ApiResponse<Claims>>> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let claims = state.tokens.authorize(authorization)?;
    Ok(Json(ApiResponse::with_message(claims, "Token is valid")))
}

pub async fn upload_note(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse<UploadedNote>>> {
    let max_upload_mb = state.notes.max_upload_mb();
    let upload_error = |err| multipart_error(err, max_upload_mb);
    let mut file = None;
    let mut target = None;

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(upload_error)?;
                file = Some((file_name, data));
            }
            "path" => {
                target = Some(field.text().await.map_err(upload_error)?);
            }
            _ => {}
        }
    }

    let (file_name, data) = file.ok_or_else(|| ApiError::BadRequest("no file uploaded".to_string()))?;

    let notes = state.notes.clone();
    let uploaded = tokio::task::spawn_blocking(move || notes.save_upload(target.as_deref(), &file_name, &data)).await??;

    info!("Uploaded note {} ({} bytes)", uploaded.path, uploaded.size);
    Ok(Json(ApiResponse::with_message(uploaded, "Upload successful")))
}

/// Body-limit rejections report the same limit as the store's own size check
fn multipart_error(err: axum::extract::multipart::MultipartError, max_upload_mb: f64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::from(NoteError::TooLarge(max_upload_mb))
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct Acknowledgement {
    pub success: bool,
    pub message: String,
}

pub async fn delete_note(State(state): State<Arc<AppState>>, Path(path): Path<String>) -> ApiResult<Json<Acknowledgement>> {
    remove_note(state, path).await
}

/// DELETE on a path that collides with a fixed admin action (`upload`, `mkdir`, `move`)
pub async fn delete_reserved_note(State(state): State<Arc<AppState>>, uri: Uri) -> ApiResult<Json<Acknowledgement>> {
    let name = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    remove_note(state, name).await
}

async fn remove_note(state: Arc<AppState>, path: String) -> ApiResult<Json<Acknowledgement>> {
    let notes = state.notes.clone();
    let target = path.clone();
    tokio::task::spawn_blocking(move || notes.delete(&target)).await??;

    info!("Deleted note path {}", path);
    Ok(Json(Acknowledgement {
        success: true,
        message: "Deleted".to_string(),
    }))
}

/// Directory creation and moves are declared but not offered yet
pub async fn not_implemented() -> ApiError {
    ApiError::NotImplemented
}
