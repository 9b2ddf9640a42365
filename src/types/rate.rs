use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use crate::error::Result;
use crate::types::pair::Pair;
use crate::types::timestamp::Timestamp;

/// One venue's quoted rate for one currency pair at a point in time.
///
/// `rate == None` marks a known-empty placeholder; `last_update == None`
/// means the record was never populated by a fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub source_id: String,
    pub pair: Pair,
    pub rate: Option<f64>,
    pub last_update: Option<Timestamp>,
}

/// Composite storage key `(source_id, pair)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub source_id: String,
    pub pair: Pair,
}

impl RateRecord {
    /// A freshly captured rate, stamped with the current time.
    pub fn new(source_id: impl Into<String>, pair: Pair, rate: f64) -> Self {
        RateRecord {
            source_id: source_id.into(),
            pair,
            rate: Some(rate),
            last_update: Some(Timestamp::now()),
        }
    }

    /// Same as [`RateRecord::new`] but validates a raw pair title.
    pub fn from_title(source_id: impl Into<String>, pair_title: &str, rate: f64) -> Result<Self> {
        Ok(RateRecord::new(source_id, Pair::parse(pair_title)?, rate))
    }

    pub fn empty(source_id: impl Into<String>, pair: Pair) -> Self {
        RateRecord {
            source_id: source_id.into(),
            pair,
            rate: None,
            last_update: None,
        }
    }

    pub fn with_last_update(mut self, last_update: Timestamp) -> Self {
        self.last_update = Some(last_update);
        self
    }

    pub fn key(&self) -> StorageKey {
        StorageKey {
            source_id: self.source_id.clone(),
            pair: self.pair.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rate.is_none()
    }

    /// Time since capture, undefined for never-populated records.
    pub fn age(&self) -> Option<Duration> {
        self.last_update.map(|ts| ts.age())
    }

    pub fn last_update_datetime(&self) -> Option<DateTime<Utc>> {
        self.last_update.and_then(|ts| ts.to_datetime())
    }
}

impl fmt::Display for RateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.rate, self.last_update_datetime()) {
            (Some(rate), Some(at)) => write!(f, "{}:{}={} @ {}", self.source_id, self.pair, rate, at),
            (Some(rate), None) => write!(f, "{}:{}={}", self.source_id, self.pair, rate),
            _ => write!(f, "{}:{}=<empty>", self.source_id, self.pair),
        }
    }
}
