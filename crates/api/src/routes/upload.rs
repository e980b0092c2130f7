//! Image upload.
//!
//! Files land under `MEDIA_ROOT/uploads/YYYY/MM/<uuid>.<ext>` and are served
//! back from `MEDIA_URL`.

use std::path::Path;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
};
use chrono::{Datelike, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::state::AppState;

/// Largest accepted image.
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Accepted extensions, lowercase.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Build the upload router.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/upload/image",
        post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE + 64 * 1024)),
    )
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    url: String,
}

/// Lowercased extension of an uploaded file name, if it is an accepted
/// image type.
#[must_use]
pub fn image_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)?;
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Relative storage path for a new upload.
fn relative_path(ext: &str) -> String {
    let now = Utc::now();
    format!(
        "uploads/{:04}/{:02}/{}.{ext}",
        now.year(),
        now.month(),
        Uuid::new_v4().simple()
    )
}

#[tracing::instrument(skip_all, fields(user_id = %user.id))]
async fn upload_image(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("上传数据无效: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_owned();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(format!("读取文件失败: {e}")))?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) = upload.ok_or_else(|| AppError::bad_request("请选择要上传的文件"))?;
    if data.is_empty() {
        return Err(AppError::bad_request("文件内容为空"));
    }
    if data.len() > MAX_IMAGE_SIZE {
        return Err(AppError::bad_request("文件大小不能超过5MB"));
    }
    let ext = image_extension(&file_name)
        .ok_or_else(|| AppError::bad_request("仅支持 jpg、jpeg、png、gif、webp 格式的图片"))?;

    let relative = relative_path(&ext);
    let target = state.config().media_root.join(&relative);
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::Internal(format!("create upload dir: {e}")))?;
    }
    tokio::fs::write(&target, &data)
        .await
        .map_err(|e| AppError::Internal(format!("write upload: {e}")))?;

    let url = format!("{}/{relative}", state.config().media_url.trim_end_matches('/'));
    tracing::info!(%url, bytes = data.len(), "image uploaded");
    Ok((StatusCode::CREATED, Json(UploadResponse { url })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(image_extension("a.b.webp").as_deref(), Some("webp"));
        assert_eq!(image_extension("doc.pdf"), None);
        assert_eq!(image_extension("noext"), None);
    }

    #[test]
    fn test_relative_path_layout() {
        let path = relative_path("png");
        let parts: Vec<&str> = path.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.first(), Some(&"uploads"));
        assert_eq!(parts.get(1).map(|y| y.len()), Some(4));
        assert_eq!(parts.get(2).map(|m| m.len()), Some(2));
        assert!(path.ends_with(".png"));
    }
}
