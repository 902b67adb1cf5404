use crate::api::error::AppError;
use crate::entities::file_records;
use crate::services::share_service::ShareService;
use crate::utils::auth::{create_download_token, validate_download_token};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ShareUnlockRequest {
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct PublicFile {
    pub filename: String,
    /// Signed download token, valid for one hour
    pub token: String,
}

#[derive(Serialize, ToSchema)]
pub struct PublicShareResponse {
    pub locked: bool,
    pub files: Vec<PublicFile>,
}

fn unlocked_listing(
    files: &[file_records::Model],
    secret: &str,
) -> Result<PublicShareResponse, AppError> {
    let files = files
        .iter()
        .map(|f| {
            Ok(PublicFile {
                filename: f.filename.clone(),
                token: create_download_token(f.id, secret)?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(PublicShareResponse {
        locked: false,
        files,
    })
}

/// Content-Type and Content-Disposition for a download
fn resolve_file_headers(filename: &str) -> (String, String) {
    let extension = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    let content_type = match extension.as_str() {
        "txt" => mime::TEXT_PLAIN_UTF_8.to_string(),
        "csv" => mime::TEXT_CSV.to_string(),
        "json" => mime::APPLICATION_JSON.to_string(),
        "pdf" => mime::APPLICATION_PDF.to_string(),
        "jpg" | "jpeg" => mime::IMAGE_JPEG.to_string(),
        "png" => mime::IMAGE_PNG.to_string(),
        "gif" => mime::IMAGE_GIF.to_string(),
        "svg" => mime::IMAGE_SVG.to_string(),
        "webp" => "image/webp".to_string(),
        "mp4" => "video/mp4".to_string(),
        "mp3" => "audio/mpeg".to_string(),
        "zip" => "application/zip".to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    };

    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    let content_disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    );

    (content_type, content_disposition)
}

/// Share status for a recipient
#[utoipa::path(
    get,
    path = "/public/share/{public_id}",
    params(("public_id" = String, Path, description = "Share public id")),
    responses(
        (status = 200, description = "Share status and download tokens when unlocked", body = PublicShareResponse),
        (status = 404, description = "Share not found"),
        (status = 410, description = "Link expired")
    ),
    tag = "public"
)]
pub async fn get_share_status(
    State(state): State<crate::AppState>,
    Path(public_id): Path<String>,
) -> Result<Json<PublicShareResponse>, AppError> {
    let (share, files) = ShareService::get_public_share(&state.db, &public_id).await?;

    if share.is_locked() {
        return Ok(Json(PublicShareResponse {
            locked: true,
            files: Vec::new(),
        }));
    }

    Ok(Json(unlocked_listing(&files, &state.config.jwt_secret)?))
}

/// Unlock a password protected share
#[utoipa::path(
    post,
    path = "/public/share/{public_id}/unlock",
    params(("public_id" = String, Path, description = "Share public id")),
    request_body = ShareUnlockRequest,
    responses(
        (status = 200, description = "Download tokens", body = PublicShareResponse),
        (status = 401, description = "Incorrect password"),
        (status = 404, description = "Share not found"),
        (status = 410, description = "Link expired")
    ),
    tag = "public"
)]
pub async fn unlock_share(
    State(state): State<crate::AppState>,
    Path(public_id): Path<String>,
    Json(body): Json<ShareUnlockRequest>,
) -> Result<Json<PublicShareResponse>, AppError> {
    let (share, files) = ShareService::get_public_share(&state.db, &public_id).await?;

    ShareService::unlock(&share, Some(&body.password))?;

    Ok(Json(unlocked_listing(&files, &state.config.jwt_secret)?))
}

/// Download a file through a signed token
#[utoipa::path(
    get,
    path = "/public/file/{token}",
    params(("token" = String, Path, description = "Download token")),
    responses(
        (status = 200, description = "File content"),
        (status = 401, description = "Invalid or expired download link"),
        (status = 404, description = "File not found"),
        (status = 410, description = "Link expired")
    ),
    tag = "public"
)]
pub async fn download_file(
    State(state): State<crate::AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let file_id = validate_download_token(&token, &state.config.jwt_secret).map_err(|e| {
        tracing::debug!("Rejected download token: {}", e);
        AppError::Unauthorized("Invalid or expired download link".to_string())
    })?;

    let record = ShareService::downloadable_file(&state.db, file_id).await?;
    let file = state.storage.open_file(&record.storage_path).await?;

    let (content_type, content_disposition) = resolve_file_headers(&record.filename);
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_for_known_type() {
        let (content_type, disposition) = resolve_file_headers("report.PDF");
        assert_eq!(content_type, "application/pdf");
        assert_eq!(
            disposition,
            "attachment; filename=\"report.PDF\"; filename*=UTF-8''report%2EPDF"
        );
    }

    #[test]
    fn test_headers_for_unicode_name() {
        let (content_type, disposition) = resolve_file_headers("фото");
        assert_eq!(content_type, "application/octet-stream");
        assert!(disposition.starts_with("attachment; filename=\"file\";"));
        assert!(disposition.contains("filename*=UTF-8''%D1%84"));
    }
}
