use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use crate::error::Result;
use crate::observability::metrics::{RECORDS_EXPIRED, RECORDS_STORED};
use crate::storage::{RateSnapshot, SourceRates, StorageBackend};
use crate::types::{Pair, RateRecord, StorageKey};

/// In-process storage with optional time-to-live.
///
/// Expired records are swept before every read and after every write.
/// `lifetime == Some(ZERO)` expires each record right after it is written;
/// `lifetime == None` disables expiry. Records that were never populated
/// (`last_update == None`) are never swept.
pub struct MemoryStorage {
    records: DashMap<StorageKey, RateRecord>,
    lifetime: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            records: DashMap::new(),
            lifetime: None,
        }
    }

    pub fn with_lifetime(lifetime: Option<Duration>) -> Self {
        MemoryStorage {
            records: DashMap::new(),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record whose age reached the lifetime. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let Some(lifetime) = self.lifetime else {
            return 0;
        };

        let before = self.records.len();
        self.records.retain(|_, record| match record.age() {
            Some(age) => age < lifetime,
            None => true,
        });

        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            RECORDS_EXPIRED.inc_by(removed as u64);
            tracing::debug!("Storage sweep expired {} records", removed);
        }
        removed
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn upsert(&self, record: RateRecord) -> Result<()> {
        self.records.insert(record.key(), record);
        RECORDS_STORED.inc();
        self.sweep();
        Ok(())
    }

    async fn get_pair(&self, source_id: &str, pair: &Pair) -> Result<RateRecord> {
        self.sweep();
        let key = StorageKey {
            source_id: source_id.to_string(),
            pair: pair.clone(),
        };
        Ok(self.records
            .get(&key)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| RateRecord::empty(source_id, pair.clone())))
    }

    async fn get_source(&self, source_id: &str) -> Result<SourceRates> {
        self.sweep();
        Ok(self.records
            .iter()
            .filter(|entry| entry.key().source_id == source_id)
            .map(|entry| (entry.key().pair.clone(), entry.value().clone()))
            .collect())
    }

    async fn get_all(&self, pair: Option<&Pair>) -> Result<RateSnapshot> {
        self.sweep();
        let mut snapshot = RateSnapshot::new();
        for entry in self.records.iter() {
            let key = entry.key();
            if pair.is_some_and(|p| *p != key.pair) {
                continue;
            }
            snapshot
                .entry(key.source_id.clone())
                .or_default()
                .insert(key.pair.clone(), entry.value().clone());
        }
        Ok(snapshot)
    }
}
