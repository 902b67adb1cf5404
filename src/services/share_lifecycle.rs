use crate::entities::{prelude::*, *};
use crate::services::storage::{StorageError, StorageService};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    TransactionTrait,
};

/// Outcome of removing one blob from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCleanup {
    Deleted,
    /// Nothing at the storage path. The record is dropped all the same.
    Missing,
    Failed(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSummary {
    pub deleted: usize,
    pub missing: usize,
    pub failed: usize,
}

impl CleanupSummary {
    pub fn record(&mut self, outcome: &BlobCleanup) {
        match outcome {
            BlobCleanup::Deleted => self.deleted += 1,
            BlobCleanup::Missing => self.missing += 1,
            BlobCleanup::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &CleanupSummary) {
        self.deleted += other.deleted;
        self.missing += other.missing;
        self.failed += other.failed;
    }

    pub fn attempted(&self) -> usize {
        self.deleted + self.missing + self.failed
    }
}

/// Result of deleting a share (or a single file) from both stores
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeOutcome {
    /// `false` when the row was already gone, e.g. removed by a concurrent purge
    pub removed: bool,
    pub blobs: CleanupSummary,
}

/// Deletion rules shared by owner actions and the expiry sweeper.
///
/// Deleting is always two phases: every blob is removed best-effort first,
/// then the rows are deleted in a transaction regardless of how phase one
/// went. The database decides whether a share still exists; a blob left
/// behind is only an orphan.
pub struct ShareLifecycle;

impl ShareLifecycle {
    pub async fn remove_blob(
        storage: &dyn StorageService,
        file: &file_records::Model,
    ) -> BlobCleanup {
        match storage.delete_file(&file.storage_path).await {
            Ok(()) => {
                tracing::debug!("Physically deleted file: {}", file.storage_path);
                BlobCleanup::Deleted
            }
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(
                    "File already gone or path missing: {} (record {})",
                    file.storage_path,
                    file.id
                );
                BlobCleanup::Missing
            }
            Err(e) => {
                tracing::error!(
                    "Failed to delete file {} (record {}): {}",
                    file.storage_path,
                    file.id,
                    e
                );
                BlobCleanup::Failed(e.to_string())
            }
        }
    }

    /// Phase one: attempt every blob, never stopping at a failure
    pub async fn remove_blobs(
        storage: &dyn StorageService,
        files: &[file_records::Model],
    ) -> CleanupSummary {
        let mut summary = CleanupSummary::default();
        for file in files {
            let outcome = Self::remove_blob(storage, file).await;
            summary.record(&outcome);
        }
        summary
    }

    /// Phase two: delete the share row and its file records.
    ///
    /// Returns `false` if the share no longer existed, which is not an error.
    pub async fn delete_share_rows(db: &impl ConnectionTrait, share_id: i32) -> Result<bool, DbErr> {
        FileRecords::delete_many()
            .filter(file_records::Column::ShareId.eq(share_id))
            .exec(db)
            .await?;

        let res = Shares::delete_by_id(share_id).exec(db).await?;
        Ok(res.rows_affected > 0)
    }

    /// Remove a share with all of its files
    pub async fn purge_share(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        share: &shares::Model,
        files: &[file_records::Model],
    ) -> Result<PurgeOutcome, DbErr> {
        let blobs = Self::remove_blobs(storage, files).await;

        let txn = db.begin().await?;
        let removed = Self::delete_share_rows(&txn, share.id).await?;
        txn.commit().await?;

        if removed {
            tracing::info!(
                "Deleted share {} ({} files, {} blobs missing, {} failed)",
                share.public_id,
                files.len(),
                blobs.missing,
                blobs.failed
            );
        } else {
            tracing::debug!("Share {} was already deleted", share.public_id);
        }

        Ok(PurgeOutcome { removed, blobs })
    }

    /// Remove a single file from its share
    pub async fn purge_file(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        file: &file_records::Model,
    ) -> Result<PurgeOutcome, DbErr> {
        let mut blobs = CleanupSummary::default();
        blobs.record(&Self::remove_blob(storage, file).await);

        let res = FileRecords::delete_by_id(file.id).exec(db).await?;

        Ok(PurgeOutcome {
            removed: res.rows_affected > 0,
            blobs,
        })
    }
}
