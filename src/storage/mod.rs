pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;
use crate::error::Result;
use crate::types::{Pair, RateRecord};

pub use memory::MemoryStorage;

/// `{source_id: {pair: record}}`
pub type SourceRates = BTreeMap<Pair, RateRecord>;
pub type RateSnapshot = BTreeMap<String, SourceRates>;

/// Keyed store of the latest rate per `(source_id, pair)`.
///
/// Writes are last-write-wins per key; there is no atomicity across the
/// records of one batch.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert or overwrite by key.
    async fn upsert(&self, record: RateRecord) -> Result<()>;

    /// The exact record, or an empty placeholder when absent.
    async fn get_pair(&self, source_id: &str, pair: &Pair) -> Result<RateRecord>;

    /// All records of one source.
    async fn get_source(&self, source_id: &str) -> Result<SourceRates>;

    /// Full snapshot, or only entries for `pair`; sources without it are omitted.
    async fn get_all(&self, pair: Option<&Pair>) -> Result<RateSnapshot>;

    async fn upsert_batch(&self, records: Vec<RateRecord>) -> Result<usize> {
        let count = records.len();
        for record in records {
            self.upsert(record).await?;
        }
        Ok(count)
    }
}
