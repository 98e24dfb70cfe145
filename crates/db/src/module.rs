use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use libris_kernel::{InitCtx, Module};

use crate::MemoryStore;

/// Core module owning the process-wide store handle: restores the snapshot on
/// init, flushes it and closes the store on stop.
pub struct DatabaseModule {
    store: Arc<MemoryStore>,
    snapshot_path: Option<PathBuf>,
}

impl DatabaseModule {
    pub fn new(store: Arc<MemoryStore>, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            store,
            snapshot_path,
        }
    }
}

#[async_trait]
impl Module for DatabaseModule {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let database = &ctx.settings.database;
        tracing::info!(
            module = self.name(),
            database = %database.name,
            operation_timeout_ms = database.operation_timeout_ms,
            "document store ready"
        );

        if let Some(path) = &self.snapshot_path {
            let loaded = self
                .store
                .load_snapshot(path)
                .await
                .with_context(|| format!("failed to restore snapshot {}", path.display()))?;
            tracing::info!(
                module = self.name(),
                path = %path.display(),
                documents = loaded,
                "snapshot restored"
            );
        }

        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.snapshot_path {
            let written = self
                .store
                .save_snapshot(path)
                .await
                .with_context(|| format!("failed to write snapshot {}", path.display()))?;
            tracing::info!(
                module = self.name(),
                path = %path.display(),
                documents = written,
                "snapshot written"
            );
        }

        self.store.close();
        tracing::info!(module = self.name(), "document store closed");
        Ok(())
    }
}

/// Create the core database module around a shared store handle
pub fn create_module(
    store: Arc<MemoryStore>,
    snapshot_path: Option<PathBuf>,
) -> Arc<dyn Module> {
    Arc::new(DatabaseModule::new(store, snapshot_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentStore;
    use libris_kernel::settings::Settings;
    use std::time::Duration;

    #[tokio::test]
    async fn stop_persists_and_closes() {
        let path =
            std::env::temp_dir().join(format!("libris-db-module-{}.json", std::process::id()));
        let settings = Settings::default();
        let ctx = InitCtx {
            settings: &settings,
        };

        let store = Arc::new(MemoryStore::new(Duration::from_millis(200)));
        let module = DatabaseModule::new(store.clone(), Some(path.clone()));
        module.init(&ctx).await.unwrap();
        store
            .insert_one("books", serde_json::Map::new())
            .await
            .unwrap();
        module.stop().await.unwrap();

        assert!(store.is_closed());
        assert!(path.exists());

        let reopened = Arc::new(MemoryStore::new(Duration::from_millis(200)));
        DatabaseModule::new(reopened.clone(), Some(path.clone()))
            .init(&ctx)
            .await
            .unwrap();
        assert_eq!(reopened.count("books").await.unwrap(), 1);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn stop_without_snapshot_only_closes() {
        let store = Arc::new(MemoryStore::new(Duration::from_millis(200)));
        let module = DatabaseModule::new(store.clone(), None);
        module.stop().await.unwrap();
        assert!(store.is_closed());
    }
}
