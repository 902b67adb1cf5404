use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::share_lifecycle::{PurgeOutcome, ShareLifecycle};
use crate::services::storage::StorageService;
use crate::utils::validation::{generate_storage_key, sanitize_filename};
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

/// A file received from the client, not yet written anywhere
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub data: Bytes,
}

/// A blob already written to storage, waiting for its record
#[derive(Debug, Clone)]
struct StoredBlob {
    filename: String,
    storage_path: String,
    size: i64,
}

/// Owner changes to an existing share
#[derive(Debug, Clone, Default)]
pub struct ShareSettings {
    /// `Some("")` removes the password
    pub password: Option<String>,
    /// New expiration relative to now
    pub expires_minutes: Option<i64>,
    /// Make the share never expire
    pub clear_expiration: bool,
    pub is_shared: Option<bool>,
}

pub type ShareWithFiles = (shares::Model, Vec<file_records::Model>);

pub struct ShareService;

impl ShareService {
    /// Generate a URL-safe random identifier for share links
    pub fn generate_public_id() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let bytes: Vec<u8> = (0..24).map(|_| rng.r#gen()).collect();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// `now + minutes`, rejecting spans chrono cannot represent
    pub fn expiry_from_now(minutes: i64) -> Result<DateTime<Utc>, AppError> {
        TimeDelta::try_minutes(minutes)
            .and_then(|span| Utc::now().checked_add_signed(span))
            .ok_or_else(|| AppError::BadRequest("Expiration time out of range".to_string()))
    }

    /// `{base_url}/download/{public_id}`
    pub fn share_link(base_url: &str, public_id: &str) -> String {
        format!("{}/download/{}", base_url.trim_end_matches('/'), public_id)
    }

    /// Hash a share password using argon2
    pub fn hash_password(password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    /// Verify a share password against the stored hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed_hash =
            argon2::PasswordHash::new(hash).map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Write every blob under a fresh key. On failure the blobs written so
    /// far are removed again.
    async fn store_blobs(
        storage: &dyn StorageService,
        uploads: Vec<IncomingFile>,
    ) -> Result<Vec<StoredBlob>, AppError> {
        let mut stored: Vec<StoredBlob> = Vec::with_capacity(uploads.len());

        for upload in uploads {
            let filename = sanitize_filename(&upload.filename);
            let storage_path = generate_storage_key(&filename);

            match storage.write_file(&storage_path, upload.data).await {
                Ok(size) => stored.push(StoredBlob {
                    filename,
                    storage_path,
                    size: size as i64,
                }),
                Err(e) => {
                    tracing::error!("Failed to store upload {}: {}", filename, e);
                    Self::discard_blobs(storage, &stored).await;
                    return Err(e.into());
                }
            }
        }

        Ok(stored)
    }

    async fn discard_blobs(storage: &dyn StorageService, blobs: &[StoredBlob]) {
        for blob in blobs {
            if let Err(e) = storage.delete_file(&blob.storage_path).await {
                tracing::warn!("Failed to discard orphan blob {}: {}", blob.storage_path, e);
            }
        }
    }

    async fn insert_records(
        db: &impl ConnectionTrait,
        share_id: i32,
        blobs: &[StoredBlob],
    ) -> Result<Vec<file_records::Model>, AppError> {
        let now = Utc::now();
        let mut records = Vec::with_capacity(blobs.len());

        for blob in blobs {
            let record = file_records::ActiveModel {
                share_id: Set(share_id),
                filename: Set(blob.filename.clone()),
                storage_path: Set(blob.storage_path.clone()),
                size: Set(blob.size),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await?;
            records.push(record);
        }

        Ok(records)
    }

    /// Create a share holding `uploads`. Blobs and rows are all in place
    /// before this returns.
    pub async fn create_share(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        owner_id: &str,
        uploads: Vec<IncomingFile>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ShareWithFiles, AppError> {
        if uploads.is_empty() {
            return Err(AppError::BadRequest("No files provided".to_string()));
        }

        let blobs = Self::store_blobs(storage, uploads).await?;

        let persisted: Result<ShareWithFiles, AppError> = async {
            let txn = db.begin().await?;

            let share = shares::ActiveModel {
                public_id: Set(Self::generate_public_id()),
                owner_id: Set(owner_id.to_string()),
                created_at: Set(Utc::now()),
                expires_at: Set(expires_at),
                password_hash: Set(None),
                is_shared: Set(true),
                ..Default::default()
            }
            .insert(&txn)
            .await?;

            let files = Self::insert_records(&txn, share.id, &blobs).await?;
            txn.commit().await?;
            Ok((share, files))
        }
        .await;

        if persisted.is_err() {
            Self::discard_blobs(storage, &blobs).await;
        }
        persisted
    }

    /// Append uploads to an existing share
    pub async fn add_files(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        share: &shares::Model,
        uploads: Vec<IncomingFile>,
    ) -> Result<Vec<file_records::Model>, AppError> {
        if uploads.is_empty() {
            return Err(AppError::BadRequest("No files provided".to_string()));
        }

        let blobs = Self::store_blobs(storage, uploads).await?;

        let persisted: Result<Vec<file_records::Model>, AppError> = async {
            let txn = db.begin().await?;
            let files = Self::insert_records(&txn, share.id, &blobs).await?;
            txn.commit().await?;
            Ok(files)
        }
        .await;

        if persisted.is_err() {
            Self::discard_blobs(storage, &blobs).await;
        }
        persisted
    }

    pub async fn find_owned_share(
        db: &DatabaseConnection,
        public_id: &str,
        owner_id: &str,
    ) -> Result<shares::Model, AppError> {
        Shares::find()
            .filter(shares::Column::PublicId.eq(public_id))
            .filter(shares::Column::OwnerId.eq(owner_id))
            .one(db)
            .await?
            .ok_or(AppError::NotFound("Share not found".to_string()))
    }

    pub async fn share_files(
        db: &DatabaseConnection,
        share_id: i32,
    ) -> Result<Vec<file_records::Model>, AppError> {
        Ok(FileRecords::find()
            .filter(file_records::Column::ShareId.eq(share_id))
            .order_by_asc(file_records::Column::Id)
            .all(db)
            .await?)
    }

    pub async fn find_owned_share_with_files(
        db: &DatabaseConnection,
        public_id: &str,
        owner_id: &str,
    ) -> Result<ShareWithFiles, AppError> {
        let share = Self::find_owned_share(db, public_id, owner_id).await?;
        let files = Self::share_files(db, share.id).await?;
        Ok((share, files))
    }

    /// All shares of a user, newest first
    pub async fn list_user_shares(
        db: &DatabaseConnection,
        owner_id: &str,
    ) -> Result<Vec<ShareWithFiles>, AppError> {
        Ok(Shares::find()
            .filter(shares::Column::OwnerId.eq(owner_id))
            .order_by_desc(shares::Column::CreatedAt)
            .find_with_related(FileRecords)
            .all(db)
            .await?)
    }

    pub async fn update_settings(
        db: &DatabaseConnection,
        public_id: &str,
        owner_id: &str,
        settings: ShareSettings,
        max_expiry_minutes: i64,
    ) -> Result<shares::Model, AppError> {
        if settings.clear_expiration && settings.expires_minutes.is_some() {
            return Err(AppError::BadRequest(
                "expires_minutes and clear_expiration are mutually exclusive".to_string(),
            ));
        }
        if let Some(minutes) = settings.expires_minutes {
            if minutes <= 0 {
                return Err(AppError::BadRequest(
                    "Expiration time must be positive".to_string(),
                ));
            }
            if minutes > max_expiry_minutes {
                return Err(AppError::BadRequest(format!(
                    "Expiration time cannot exceed {} minutes",
                    max_expiry_minutes
                )));
            }
        }

        let share = Self::find_owned_share(db, public_id, owner_id).await?;
        let mut active: shares::ActiveModel = share.into();

        match settings.password.as_deref() {
            Some("") => active.password_hash = Set(None),
            Some(password) => active.password_hash = Set(Some(Self::hash_password(password)?)),
            None => {}
        }

        if let Some(minutes) = settings.expires_minutes {
            active.expires_at = Set(Some(Self::expiry_from_now(minutes)?));
        } else if settings.clear_expiration {
            active.expires_at = Set(None);
        }

        if let Some(is_shared) = settings.is_shared {
            active.is_shared = Set(is_shared);
        }

        Ok(active.update(db).await?)
    }

    /// Owner deletion. Deleting a share that a concurrent purge already
    /// removed succeeds with `removed == false`.
    pub async fn delete_share(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        public_id: &str,
        owner_id: &str,
    ) -> Result<PurgeOutcome, AppError> {
        let (share, files) = Self::find_owned_share_with_files(db, public_id, owner_id).await?;
        Ok(ShareLifecycle::purge_share(db, storage, &share, &files).await?)
    }

    pub async fn delete_file(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        public_id: &str,
        owner_id: &str,
        file_id: i32,
    ) -> Result<PurgeOutcome, AppError> {
        let share = Self::find_owned_share(db, public_id, owner_id).await?;

        let file = FileRecords::find_by_id(file_id)
            .filter(file_records::Column::ShareId.eq(share.id))
            .one(db)
            .await?
            .ok_or(AppError::NotFound("File not found".to_string()))?;

        Ok(ShareLifecycle::purge_file(db, storage, &file).await?)
    }

    /// Public lookup by link. Hidden and unknown shares are both "not found";
    /// an expired share is reported as gone even before the sweeper runs.
    pub async fn get_public_share(
        db: &DatabaseConnection,
        public_id: &str,
    ) -> Result<ShareWithFiles, AppError> {
        let (share, files) = Shares::find()
            .filter(shares::Column::PublicId.eq(public_id))
            .find_with_related(FileRecords)
            .all(db)
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotFound("Share not found".to_string()))?;

        if !share.is_shared {
            return Err(AppError::NotFound("Share not found".to_string()));
        }
        if share.is_expired_at(Utc::now()) {
            return Err(AppError::Gone("Link expired".to_string()));
        }

        Ok((share, files))
    }

    /// Check the password of a locked share. Unlocked shares pass as is.
    pub fn unlock(share: &shares::Model, password: Option<&str>) -> Result<(), AppError> {
        let Some(hash) = share.password_hash.as_deref() else {
            return Ok(());
        };

        let verified = match password {
            Some(p) if !p.is_empty() => Self::verify_password(p, hash)?,
            _ => false,
        };

        if verified {
            Ok(())
        } else {
            Err(AppError::Unauthorized("Incorrect password".to_string()))
        }
    }

    /// Resolve the target of a verified download token
    pub async fn downloadable_file(
        db: &DatabaseConnection,
        file_id: i32,
    ) -> Result<file_records::Model, AppError> {
        let (file, share) = FileRecords::find_by_id(file_id)
            .find_also_related(Shares)
            .one(db)
            .await?
            .ok_or(AppError::NotFound("File not found".to_string()))?;

        match share {
            Some(share) if share.is_expired_at(Utc::now()) => {
                Err(AppError::Gone("Link expired".to_string()))
            }
            Some(_) => Ok(file),
            None => Err(AppError::NotFound("File not found".to_string())),
        }
    }
}
