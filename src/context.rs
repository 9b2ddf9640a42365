use std::sync::Arc;
use tracing::{error, info};
use crate::config::AppConfig;
use crate::error::Result;
use crate::orchestrator::{RefreshingReader, ScrapingManager};
use crate::scrapers::{self, RateSource};
use crate::storage::{MemoryStorage, StorageBackend};

/// Everything the service shares between the updaters and the API.
///
/// Built once at startup and handed to whoever needs it; tests build
/// their own with custom sources.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageBackend>,
    pub manager: Arc<ScrapingManager>,
}

impl AppContext {
    /// Wire storage and every enabled venue from the static source table.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let sources = scrapers::build_sources(&config.sources)?;
        Self::with_sources(config, sources).await
    }

    pub async fn with_sources(config: AppConfig, sources: Vec<Arc<dyn RateSource>>) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> =
            Arc::new(MemoryStorage::with_lifetime(config.scraping.storage_lifetime()));
        let manager = ScrapingManager::with_sources(storage.clone(), sources).await?;

        Ok(AppContext {
            config: Arc::new(config),
            storage,
            manager: Arc::new(manager),
        })
    }

    pub fn reader(&self) -> RefreshingReader {
        RefreshingReader::new(self.manager.clone())
    }

    /// Initial full refresh, continuous updaters, then the startup health
    /// check. Updaters are stopped again if the check fails.
    pub async fn start(&self) -> Result<()> {
        info!("Run scraping manager flow...");
        self.manager.update_all(None).await;

        let started = self.manager.run_active_updaters().await;
        info!("Started {} updaters", started);

        tokio::time::sleep(self.config.scraping.wait_workers_timeout()).await;

        if let Err(e) = self.manager.check_updaters_health().await {
            error!("Startup health check failed: {}", e);
            self.manager.stop_active_updaters().await;
            return Err(e);
        }

        info!("Scraping manager flow started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Stopping scraping manager flow...");
        let aborted = self.manager
            .shutdown(self.config.scraping.stop_workers_timeout())
            .await;
        if !aborted.is_empty() {
            error!("Updaters aborted after grace period: {:?}", aborted);
        }
        info!("Scraping manager flow stopped");
    }
}
