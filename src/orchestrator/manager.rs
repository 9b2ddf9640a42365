//! Scraping manager
//!
//! Drives one-shot and continuous updates from the registered sources into
//! storage, and serves reads back out of storage.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tracing::{error, info, warn, Instrument};
use crate::error::{Error, Result};
use crate::observability::metrics::{GaugeGuard, ACTIVE_UPDATERS, SOURCE_FETCHES, SOURCE_FETCH_FAILURES};
use crate::observability::tracing::trace_source_update;
use crate::orchestrator::registry::{SourceRef, SourceRegistry};
use crate::scrapers::{RateSource, RateStream};
use crate::storage::{RateSnapshot, StorageBackend};
use crate::types::{Pair, RateRecord};
use crate::utils::task_supervisor::TaskSupervisor;

pub struct ScrapingManager {
    registry: SourceRegistry,
    storage: Arc<dyn StorageBackend>,
    supervisor: Mutex<TaskSupervisor>,
}

impl ScrapingManager {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        ScrapingManager {
            registry: SourceRegistry::new(),
            storage,
            supervisor: Mutex::new(TaskSupervisor::new()),
        }
    }

    pub async fn with_sources(
        storage: Arc<dyn StorageBackend>,
        sources: Vec<Arc<dyn RateSource>>,
    ) -> Result<Self> {
        let manager = Self::new(storage);
        manager.register(sources).await?;
        Ok(manager)
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub async fn register(&self, sources: Vec<Arc<dyn RateSource>>) -> Result<()> {
        self.registry.register(sources).await
    }

    /// Remove sources, signalling their listeners to stop.
    pub async fn unregister(&self, refs: &[SourceRef]) -> Result<()> {
        for source in self.registry.unregister(refs).await? {
            source.stop();
        }
        Ok(())
    }

    pub async fn resolve(&self, source: &SourceRef) -> Result<Arc<dyn RateSource>> {
        self.registry.resolve(source).await
    }

    pub async fn source_ids(&self) -> Vec<String> {
        self.registry.source_ids().await
    }

    /// Fetch from one source and store the result. Returns the number of records written.
    pub async fn update_from(&self, source: &SourceRef, pair: Option<&Pair>) -> Result<usize> {
        let source = self.resolve(source).await?;
        let source_id = source.source_id().to_string();

        async {
            SOURCE_FETCHES.with_label_values(&[&source_id]).inc();
            let records = source.fetch(pair).await
                .and_then(|records| stamp_batch(&source_id, pair, records))
                .inspect_err(|_| SOURCE_FETCH_FAILURES.with_label_values(&[&source_id]).inc())?;

            let written = self.storage.upsert_batch(records).await?;
            tracing::debug!("Stored {} records from {}", written, source_id);
            Ok::<_, Error>(written)
        }
        .instrument(trace_source_update(&source_id))
        .await
    }

    /// Update every registered source. A failing source is logged and
    /// never aborts the others.
    pub async fn update_all(&self, pair: Option<&Pair>) {
        let ids = self.registry.source_ids().await;
        let updates = ids.iter().map(|id| async move {
            (id, self.update_from(&SourceRef::Id(id.clone()), pair).await)
        });

        for (id, result) in join_all(updates).await {
            if let Err(e) = result {
                warn!("Update from {} failed: {}", id, e);
            }
        }
    }

    /// Spawn one continuous-update task per auto-start source. Sources whose
    /// task is still alive are skipped. Returns the number of tasks started.
    pub async fn run_active_updaters(&self) -> usize {
        let mut supervisor = self.supervisor.lock().await;
        let finished = supervisor.finished_tasks();
        let mut started = 0;

        for source in self.registry.sources().await {
            let source_id = source.source_id().to_string();
            if !source.auto_start() {
                continue;
            }
            if supervisor.is_tracked(&source_id) && !finished.contains(&source_id) {
                warn!("Updater for {} already running", source_id);
                continue;
            }

            info!("Creating task for {} updater...", source_id);
            // Opened here so the source reports running before the task is first polled.
            let stream = source.clone().open_listener(None, None);
            supervisor.spawn(
                source_id.clone(),
                drain_listener(source_id.clone(), stream, self.storage.clone()),
            );
            started += 1;
            info!("Updater task {} ready!", source_id);
        }

        started
    }

    /// Signal every registered source to stop. Does not wait for the tasks.
    pub async fn stop_active_updaters(&self) {
        for source in self.registry.sources().await {
            source.stop();
        }
    }

    /// Stop updaters and join their tasks, aborting those still running
    /// after `grace`. Returns the ids of aborted tasks.
    pub async fn shutdown(&self, grace: Duration) -> Vec<String> {
        self.stop_active_updaters().await;
        self.supervisor.lock().await.join_all(grace).await
    }

    /// Every auto-start source must report a running listener.
    pub async fn check_updaters_health(&self) -> Result<()> {
        let failing: Vec<String> = self.registry.sources().await
            .into_iter()
            .filter(|source| source.auto_start() && !source.is_running())
            .map(|source| source.source_id().to_string())
            .collect();

        if failing.is_empty() {
            Ok(())
        } else {
            error!("Updaters not running: {:?}", failing);
            Err(Error::StartupHealthCheckFailure(failing))
        }
    }

    /// Stored records of one source: the exact pair (or its placeholder), or all of them.
    pub async fn get(&self, source: &SourceRef, pair: Option<&Pair>) -> Result<Vec<RateRecord>> {
        let source = self.resolve(source).await?;
        match pair {
            Some(pair) => Ok(vec![self.storage.get_pair(source.source_id(), pair).await?]),
            None => Ok(self.storage.get_source(source.source_id()).await?.into_values().collect()),
        }
    }

    pub async fn get_all(&self, pair: Option<&Pair>) -> Result<RateSnapshot> {
        self.storage.get_all(pair).await
    }

    pub async fn get_all_flat(&self, pair: Option<&Pair>) -> Result<Vec<RateRecord>> {
        Ok(self.get_all(pair).await?
            .into_values()
            .flat_map(|rates| rates.into_values())
            .collect())
    }
}

/// Stamp `source_id` on each record and enforce the fetch contract.
fn stamp_batch(source_id: &str, pair: Option<&Pair>, records: Vec<RateRecord>) -> Result<Vec<RateRecord>> {
    if let Some(pair) = pair {
        if records.len() > 1 {
            return Err(Error::invalid_result(
                source_id,
                format!("expected at most one record for {}, got {}", pair, records.len()),
            ));
        }
        if let Some(other) = records.iter().find(|r| r.pair != *pair) {
            return Err(Error::invalid_result(
                source_id,
                format!("requested {} but got {}", pair, other.pair),
            ));
        }
    }

    records.into_iter()
        .map(|mut record| {
            if let Some(rate) = record.rate {
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(Error::invalid_result(
                        source_id,
                        format!("rate {} for {} is not a positive number", rate, record.pair),
                    ));
                }
            }
            record.source_id = source_id.to_string();
            Ok(record)
        })
        .collect()
}

/// Continuous-update task body: drain the listener into storage until it ends.
async fn drain_listener(source_id: String, mut stream: RateStream, storage: Arc<dyn StorageBackend>) {
    let _active = GaugeGuard::new(&ACTIVE_UPDATERS);

    while let Some(batch) = stream.next().await {
        SOURCE_FETCHES.with_label_values(&[&source_id]).inc();
        let records = match batch.and_then(|records| stamp_batch(&source_id, None, records)) {
            Ok(records) => records,
            Err(e) => {
                SOURCE_FETCH_FAILURES.with_label_values(&[&source_id]).inc();
                warn!("Updater {} skipped a batch: {}", source_id, e);
                continue;
            }
        };

        if let Err(e) = storage.upsert_batch(records).await {
            error!("Updater {} failed to store batch: {}", source_id, e);
        }
    }

    info!("Updater task {} finished", source_id);
}
