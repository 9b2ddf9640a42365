//! Refresh-on-miss reader
//!
//! Reads from storage and, when coverage looks insufficient, asks the
//! manager for one live update before reading again.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};
use crate::error::{Error, Result};
use crate::observability::metrics::REFRESH_ON_MISS;
use crate::observability::tracing::trace_refresh_read;
use crate::orchestrator::manager::ScrapingManager;
use crate::orchestrator::registry::SourceRef;
use crate::types::{Pair, RateRecord};

/// Number of live refreshes a single read may trigger.
const REFRESH_BUDGET: u32 = 1;

pub struct RefreshingReader {
    manager: Arc<ScrapingManager>,
    source: Option<SourceRef>,
    pair: Option<Pair>,
    force_refresh_allowed: bool,
}

impl RefreshingReader {
    pub fn new(manager: Arc<ScrapingManager>) -> Self {
        RefreshingReader {
            manager,
            source: None,
            pair: None,
            force_refresh_allowed: true,
        }
    }

    pub fn source(mut self, source: impl Into<SourceRef>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn pair(mut self, pair: Pair) -> Self {
        self.pair = Some(pair);
        self
    }

    pub fn force_refresh_allowed(mut self, allowed: bool) -> Self {
        self.force_refresh_allowed = allowed;
        self
    }

    /// Best-effort records matching the filters. Still-insufficient data
    /// after the refresh is returned as is.
    pub async fn read(&self) -> Result<Vec<RateRecord>> {
        let span = trace_refresh_read(
            self.source.as_ref().map(|s| s.id()),
            self.pair.as_ref().map(|p| p.title()).as_deref(),
        );

        async {
            let mut budget = if self.force_refresh_allowed { REFRESH_BUDGET } else { 0 };
            loop {
                let records = self.current().await?;
                if budget == 0 || !self.is_insufficient(&records).await {
                    return Ok(records);
                }
                budget -= 1;
                REFRESH_ON_MISS.inc();
                self.refresh().await?;
            }
        }
        .instrument(span)
        .await
    }

    async fn current(&self) -> Result<Vec<RateRecord>> {
        match &self.source {
            Some(source) => self.manager.get(source, self.pair.as_ref()).await,
            None => self.manager.get_all_flat(self.pair.as_ref()).await,
        }
    }

    async fn is_insufficient(&self, records: &[RateRecord]) -> bool {
        if records.is_empty() {
            return true;
        }
        if records.len() == 1 && records[0].rate.is_none() {
            return true;
        }
        if self.source.is_none() {
            let seen: BTreeSet<&str> = records.iter().map(|r| r.source_id.as_str()).collect();
            return seen.len() < self.manager.registry().len().await;
        }
        false
    }

    async fn refresh(&self) -> Result<()> {
        debug!("Insufficient data, refreshing");
        match &self.source {
            Some(source) => match self.manager.update_from(source, self.pair.as_ref()).await {
                Ok(_) => Ok(()),
                Err(e @ Error::UnknownSource(_)) => Err(e),
                Err(e) => {
                    warn!("Refresh from {} failed: {}", source.id(), e);
                    Ok(())
                }
            },
            None => {
                self.manager.update_all(self.pair.as_ref()).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use crate::scrapers::{ListenerState, RateSource};
    use crate::storage::{MemoryStorage, StorageBackend};

    struct ScriptedSource {
        id: &'static str,
        pair: Option<&'static str>,
        calls: AtomicUsize,
        state: ListenerState,
    }

    impl ScriptedSource {
        fn new(id: &'static str, pair: Option<&'static str>) -> Arc<Self> {
            Arc::new(ScriptedSource {
                id,
                pair,
                calls: AtomicUsize::new(0),
                state: ListenerState::new(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateSource for ScriptedSource {
        fn source_id(&self) -> &str {
            self.id
        }

        fn listener_state(&self) -> &ListenerState {
            &self.state
        }

        async fn fetch(&self, pair: Option<&Pair>) -> Result<Vec<RateRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pair {
                Some(title) => {
                    let record = RateRecord::from_title(self.id, title, 0.5)?;
                    if pair.is_some_and(|p| *p != record.pair) {
                        Ok(Vec::new())
                    } else {
                        Ok(vec![record])
                    }
                }
                None => Ok(Vec::new()),
            }
        }
    }

    async fn manager(sources: Vec<Arc<dyn RateSource>>) -> Arc<ScrapingManager> {
        let manager = ScrapingManager::new(Arc::new(MemoryStorage::new()));
        manager.register(sources).await.unwrap();
        Arc::new(manager)
    }

    #[tokio::test]
    async fn test_miss_triggers_single_refresh() {
        let source = ScriptedSource::new("binance", Some("USDT_BTC"));
        let manager = manager(vec![source.clone()]).await;

        let records = RefreshingReader::new(manager.clone()).source("binance").read().await.unwrap();
        assert_eq!(source.calls(), 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rate, Some(0.5));

        // Data present: no further fetch.
        RefreshingReader::new(manager).source("binance").read().await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_is_bounded_when_still_empty() {
        let empty = ScriptedSource::new("empty", None);
        let manager = manager(vec![empty.clone()]).await;

        let records = RefreshingReader::new(manager).read().await.unwrap();
        assert!(records.is_empty());
        assert_eq!(empty.calls(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_counts_as_miss() {
        let source = ScriptedSource::new("binance", Some("USDT_BTC"));
        let manager = manager(vec![source.clone()]).await;
        let pair = Pair::parse("USDT_ETH").unwrap();

        let records = RefreshingReader::new(manager)
            .source("binance")
            .pair(pair.clone())
            .read()
            .await
            .unwrap();
        assert_eq!(source.calls(), 1);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_empty());
        assert_eq!(records[0].pair, pair);
    }

    #[tokio::test]
    async fn test_missing_source_coverage_triggers_update_all() {
        let a = ScriptedSource::new("a", Some("USDT_BTC"));
        let b = ScriptedSource::new("b", Some("USDT_ETH"));
        let manager = manager(vec![a.clone(), b.clone()]).await;
        manager.update_from(&"a".into(), None).await.unwrap();

        let records = RefreshingReader::new(manager).read().await.unwrap();
        assert_eq!(a.calls(), 2);
        assert_eq!(b.calls(), 1);
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_disabled() {
        let source = ScriptedSource::new("binance", Some("USDT_BTC"));
        let manager = manager(vec![source.clone()]).await;

        let records = RefreshingReader::new(manager)
            .force_refresh_allowed(false)
            .read()
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_source_surfaces() {
        let manager = manager(Vec::new()).await;
        let err = RefreshingReader::new(manager).source("nope").read().await.unwrap_err();
        assert!(matches!(err, Error::UnknownSource(_)));
    }

    #[tokio::test]
    async fn test_always_expired_storage_refreshes_once() {
        let source = ScriptedSource::new("binance", Some("USDT_BTC"));
        let storage = Arc::new(MemoryStorage::with_lifetime(Some(Duration::ZERO)));
        let manager = ScrapingManager::new(storage.clone());
        manager.register(vec![source.clone()]).await.unwrap();

        let records = RefreshingReader::new(Arc::new(manager)).read().await.unwrap();
        assert!(records.is_empty());
        assert_eq!(source.calls(), 1);
        assert!(storage.get_all(None).await.unwrap().is_empty());
    }
}
