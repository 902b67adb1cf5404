use crate::api::error::AppError;
use crate::entities::{file_records, shares};
use crate::services::share_service::{IncomingFile, ShareService, ShareSettings};
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ── Request / Response Types ──────────────────────────────────────────

#[derive(Serialize, ToSchema)]
pub struct FileResponse {
    pub id: i32,
    pub filename: String,
    pub size: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ShareResponse {
    pub public_id: String,
    pub share_link: String,
    pub files: Vec<FileResponse>,
    pub expires_at: Option<chrono::DateTime<Utc>>,
    pub password_protected: bool,
    pub created_at: chrono::DateTime<Utc>,
    pub is_shared: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ShareListItem {
    pub public_id: String,
    pub share_link: String,
    pub file_count: usize,
    pub expires_at: Option<chrono::DateTime<Utc>>,
    pub password_protected: bool,
    pub created_at: chrono::DateTime<Utc>,
    pub is_shared: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateShareRequest {
    /// New password; an empty string removes it
    pub password: Option<String>,
    /// Expire this many minutes from now
    pub expires_minutes: Option<i64>,
    /// Remove the expiration entirely
    #[serde(default)]
    pub clear_expiration: bool,
    pub is_shared: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

fn share_response(
    base_url: &str,
    share: &shares::Model,
    files: &[file_records::Model],
) -> ShareResponse {
    ShareResponse {
        public_id: share.public_id.clone(),
        share_link: ShareService::share_link(base_url, &share.public_id),
        files: files
            .iter()
            .map(|f| FileResponse {
                id: f.id,
                filename: f.filename.clone(),
                size: f.size,
            })
            .collect(),
        expires_at: share.expires_at,
        password_protected: share.is_locked(),
        created_at: share.created_at,
        is_shared: share.is_shared,
    }
}

/// Collect every file part of a multipart body
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<IncomingFile>, AppError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        let err_msg = e.to_string();
        if err_msg.contains("length limit exceeded") {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        } else {
            AppError::BadRequest(err_msg)
        }
    })? {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        uploads.push(IncomingFile { filename, data });
    }

    if uploads.is_empty() {
        return Err(AppError::BadRequest("No files provided".to_string()));
    }

    Ok(uploads)
}

// ── Authenticated Endpoints ───────────────────────────────────────────

/// Upload files into a new share
#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = String, description = "Multipart form with one or more `files` parts", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Share created", body = ShareResponse),
        (status = 400, description = "No files provided"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "Upload too large")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn upload_files(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<Json<ShareResponse>, AppError> {
    let uploads = read_uploads(multipart).await?;
    let expires_at = ShareService::expiry_from_now(state.config.default_share_expiry_minutes)?;

    let (share, files) = ShareService::create_share(
        &state.db,
        state.storage.as_ref(),
        &claims.sub,
        uploads,
        Some(expires_at),
    )
    .await?;

    tracing::info!(
        event = "upload",
        user_id = %claims.sub,
        share_id = %share.public_id,
        files = ?files.iter().map(|f| f.filename.as_str()).collect::<Vec<_>>(),
        "Files uploaded"
    );

    Ok(Json(share_response(&state.config.base_url, &share, &files)))
}

/// Add files to an existing share
#[utoipa::path(
    post,
    path = "/share/{public_id}/files",
    params(("public_id" = String, Path, description = "Share public id")),
    request_body(content = String, description = "Multipart form with one or more `files` parts", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Files added", body = ShareResponse),
        (status = 404, description = "Share not found")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn add_files(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(public_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ShareResponse>, AppError> {
    let share = ShareService::find_owned_share(&state.db, &public_id, &claims.sub).await?;
    let uploads = read_uploads(multipart).await?;

    let added =
        ShareService::add_files(&state.db, state.storage.as_ref(), &share, uploads).await?;

    tracing::info!(
        event = "add_files",
        user_id = %claims.sub,
        share_id = %share.public_id,
        files = ?added.iter().map(|f| f.filename.as_str()).collect::<Vec<_>>(),
        "Files added to share"
    );

    let files = ShareService::share_files(&state.db, share.id).await?;
    Ok(Json(share_response(&state.config.base_url, &share, &files)))
}

/// List the caller's shares
#[utoipa::path(
    get,
    path = "/shares",
    responses(
        (status = 200, description = "Shares of the current user", body = Vec<ShareListItem>),
        (status = 401, description = "Unauthorized")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn list_shares(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ShareListItem>>, AppError> {
    let shares = ShareService::list_user_shares(&state.db, &claims.sub).await?;

    let items = shares
        .into_iter()
        .map(|(share, files)| ShareListItem {
            share_link: ShareService::share_link(&state.config.base_url, &share.public_id),
            file_count: files.len(),
            expires_at: share.expires_at,
            password_protected: share.is_locked(),
            created_at: share.created_at,
            is_shared: share.is_shared,
            public_id: share.public_id,
        })
        .collect();

    Ok(Json(items))
}

/// Get one of the caller's shares
#[utoipa::path(
    get,
    path = "/share/{public_id}",
    params(("public_id" = String, Path, description = "Share public id")),
    responses(
        (status = 200, description = "Share details", body = ShareResponse),
        (status = 404, description = "Share not found")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn get_share(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(public_id): Path<String>,
) -> Result<Json<ShareResponse>, AppError> {
    let (share, files) =
        ShareService::find_owned_share_with_files(&state.db, &public_id, &claims.sub).await?;
    Ok(Json(share_response(&state.config.base_url, &share, &files)))
}

/// Change password, expiration or visibility of a share
#[utoipa::path(
    post,
    path = "/share/{public_id}",
    params(("public_id" = String, Path, description = "Share public id")),
    request_body = UpdateShareRequest,
    responses(
        (status = 200, description = "Settings updated", body = MessageResponse),
        (status = 400, description = "Invalid settings"),
        (status = 404, description = "Share not found")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn update_share_settings(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(public_id): Path<String>,
    Json(req): Json<UpdateShareRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let settings = ShareSettings {
        password: req.password,
        expires_minutes: req.expires_minutes,
        clear_expiration: req.clear_expiration,
        is_shared: req.is_shared,
    };

    ShareService::update_settings(
        &state.db,
        &public_id,
        &claims.sub,
        settings,
        state.config.max_share_expiry_minutes,
    )
    .await?;

    Ok(MessageResponse::new("Share settings updated"))
}

/// Delete a share and all of its files
#[utoipa::path(
    delete,
    path = "/share/{public_id}",
    params(("public_id" = String, Path, description = "Share public id")),
    responses(
        (status = 200, description = "Share deleted", body = MessageResponse),
        (status = 404, description = "Share not found")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn delete_share(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(public_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let outcome =
        ShareService::delete_share(&state.db, state.storage.as_ref(), &public_id, &claims.sub)
            .await?;

    tracing::info!(
        event = "delete_share",
        user_id = %claims.sub,
        share_id = %public_id,
        removed = outcome.removed,
        blobs_failed = outcome.blobs.failed,
        "Share deleted"
    );

    Ok(MessageResponse::new("Share deleted successfully"))
}

/// Delete one file from a share
#[utoipa::path(
    delete,
    path = "/share/{public_id}/file/{file_id}",
    params(
        ("public_id" = String, Path, description = "Share public id"),
        ("file_id" = i32, Path, description = "File record id")
    ),
    responses(
        (status = 200, description = "File deleted", body = MessageResponse),
        (status = 404, description = "Share or file not found")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn delete_file(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path((public_id, file_id)): Path<(String, i32)>,
) -> Result<Json<MessageResponse>, AppError> {
    ShareService::delete_file(
        &state.db,
        state.storage.as_ref(),
        &public_id,
        &claims.sub,
        file_id,
    )
    .await?;

    Ok(MessageResponse::new("File deleted successfully"))
}
