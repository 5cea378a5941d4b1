//! Client distribution endpoints under `/exporter`.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use std::io::ErrorKind;
use std::path::Path;

/// GET /exporter/GetVersion - Current client version string.
pub async fn get_version(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let path = state
        .config
        .exporter
        .version_path
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("no client version published".to_string()))?;
    let version = read_file(path).await?;
    let version = String::from_utf8_lossy(&version).trim().to_string();

    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], version))
}

/// GET /exporter/GetArchive - Current client build archive.
pub async fn get_archive(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let path = state
        .config
        .exporter
        .archive_path
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("no client archive published".to_string()))?;
    let data = read_file(path).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("calsnap-client.zip");
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

async fn read_file(path: &Path) -> ApiResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ApiError::NotFound("file not published".to_string()),
        _ => ApiError::Internal(format!("failed to read {}: {e}", path.display())),
    })
}
