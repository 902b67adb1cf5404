use crate::services::storage::LocalStorageService;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(files_dir: &str) -> anyhow::Result<Arc<LocalStorageService>> {
    let storage = LocalStorageService::new(files_dir);
    storage.init().await?;

    info!("🗄️  File storage: {}", storage.root().display());

    Ok(Arc::new(storage))
}
