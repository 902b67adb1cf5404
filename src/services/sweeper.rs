use crate::entities::{prelude::*, *};
use crate::services::share_lifecycle::{CleanupSummary, ShareLifecycle};
use crate::services::storage::StorageService;
use chrono::Utc;
use futures::FutureExt;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Time between two sweep cycles
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired shares found by the cycle
    pub expired: usize,
    /// Share rows actually deleted by the cycle's transaction
    pub shares_removed: usize,
    pub blobs: CleanupSummary,
}

/// Background task reclaiming shares whose expiration has passed.
///
/// Owned by the process supervisor and stopped through the `shutdown`
/// channel. The wait between cycles is raced against that channel so a stop
/// request never waits out the interval.
pub struct ExpirySweeper {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    shutdown: watch::Receiver<bool>,
}

impl ExpirySweeper {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            storage,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🧹 Expiry sweeper started (interval: {:?})", SWEEP_INTERVAL);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.run_cycle().await;

            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = sleep(SWEEP_INTERVAL) => {}
            }
        }

        tracing::info!("🛑 Expiry sweeper shutting down");
    }

    /// One cycle with every failure contained: errors and panics are logged
    /// and the sweeper carries on with the next interval.
    async fn run_cycle(&self) {
        match AssertUnwindSafe(self.sweep_once()).catch_unwind().await {
            Ok(Ok(report)) if report.expired > 0 => {
                tracing::info!(
                    "✅ Sweep committed: {} shares removed, {} files deleted, {} already missing, {} failed",
                    report.shares_removed,
                    report.blobs.deleted,
                    report.blobs.missing,
                    report.blobs.failed
                );
            }
            Ok(Ok(_)) => tracing::debug!("Sweep found no expired shares"),
            Ok(Err(e)) => tracing::error!("❌ Expiry sweep failed: {:?}", e),
            Err(_) => tracing::error!("❌ Expiry sweep panicked, retrying next cycle"),
        }
    }

    /// Reclaim every share whose expiration lies strictly in the past.
    ///
    /// Blob removal is best-effort. Row deletions for the whole cycle are
    /// committed in one transaction; a cycle with nothing to do commits
    /// nothing.
    pub async fn sweep_once(&self) -> anyhow::Result<SweepReport> {
        let now = Utc::now();

        // Null expirations are excluded explicitly rather than through
        // NULL comparison semantics.
        let expired = Shares::find()
            .filter(shares::Column::ExpiresAt.is_not_null())
            .filter(shares::Column::ExpiresAt.lt(now))
            .find_with_related(FileRecords)
            .all(&self.db)
            .await?;

        let mut report = SweepReport {
            expired: expired.len(),
            ..Default::default()
        };

        if expired.is_empty() {
            return Ok(report);
        }

        tracing::info!("Found {} expired shares to clean up", expired.len());

        for (share, files) in &expired {
            tracing::info!(
                share = %share.public_id,
                files = files.len(),
                "Processing cleanup for expired share"
            );
            let blobs = ShareLifecycle::remove_blobs(self.storage.as_ref(), files).await;
            report.blobs.merge(&blobs);
        }

        let txn = self.db.begin().await?;
        for (share, _) in &expired {
            if ShareLifecycle::delete_share_rows(&txn, share.id).await? {
                report.shares_removed += 1;
            } else {
                tracing::debug!("Share {} was deleted concurrently", share.public_id);
            }
        }
        txn.commit().await?;

        Ok(report)
    }
}
