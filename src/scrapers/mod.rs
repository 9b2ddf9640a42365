pub mod binance;
pub mod kraken;
pub mod listener;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use crate::config::SourcesConfig;
use crate::error::Result;
use crate::types::{Pair, RateRecord};

pub use listener::{poll_listener, ListenerRun, ListenerState, ListenerStatus};

pub const DEFAULT_LISTENER_DELAY: Duration = Duration::from_millis(100);

/// Lazy, non-restartable sequence of fetched batches.
pub type RateStream = BoxStream<'static, Result<Vec<RateRecord>>>;

/// A venue that knows how to fetch rates, on demand or continuously.
///
/// Every rate produced is the mid of best bid and best ask (or a
/// venue-provided equivalent), already translated to canonical pairs.
#[async_trait]
pub trait RateSource: Send + Sync + 'static {
    fn source_id(&self) -> &str;

    /// Whether a continuous updater should run for this source from startup.
    fn auto_start(&self) -> bool {
        true
    }

    fn default_delay(&self) -> Duration {
        DEFAULT_LISTENER_DELAY
    }

    fn listener_state(&self) -> &ListenerState;

    /// Rates for `pair` only (at most one record), or every pair the venue knows.
    async fn fetch(&self, pair: Option<&Pair>) -> Result<Vec<RateRecord>>;

    /// Defaults to polling `fetch()` every `delay`; push-based venues override it.
    fn open_listener(self: Arc<Self>, delay: Option<Duration>, max_iterations: Option<u64>) -> RateStream {
        let delay = delay.unwrap_or_else(|| self.default_delay());
        poll_listener(self, delay, max_iterations)
    }

    fn stop(&self) {
        if self.listener_state().request_stop() {
            tracing::info!("Stop requested for {} listener", self.source_id());
        }
    }

    fn is_running(&self) -> bool {
        self.listener_state().is_running()
    }
}

/// Compile-time identity of a source type, used to refer to a source by type.
pub trait SourceKind {
    const SOURCE_ID: &'static str;
}

type SourceConstructor = fn(&SourcesConfig) -> Result<Option<Arc<dyn RateSource>>>;

/// Every venue known to the application. Adding a venue means adding a row.
const SOURCE_TABLE: &[(&str, SourceConstructor)] = &[
    (binance::BinanceSource::SOURCE_ID, binance::from_config),
    (kraken::KrakenSource::SOURCE_ID, kraken::from_config),
];

pub fn known_source_ids() -> Vec<&'static str> {
    SOURCE_TABLE.iter().map(|(id, _)| *id).collect()
}

/// Instantiate every enabled venue from the static table.
pub fn build_sources(config: &SourcesConfig) -> Result<Vec<Arc<dyn RateSource>>> {
    let mut sources = Vec::new();
    for (source_id, constructor) in SOURCE_TABLE {
        match constructor(config)? {
            Some(source) => sources.push(source),
            None => tracing::info!("Source {} disabled by configuration", source_id),
        }
    }
    Ok(sources)
}

/// Average of best bid and best ask; `None` for a missing side.
pub fn mid_price(bid: f64, ask: f64) -> Option<f64> {
    if bid.is_finite() && ask.is_finite() && bid > 0.0 && ask > 0.0 {
        Some((bid + ask) / 2.0)
    } else {
        None
    }
}

/// Rate of the inverted pair.
pub fn reciprocal(rate: f64) -> Option<f64> {
    if rate.is_finite() && rate > 0.0 {
        Some(1.0 / rate)
    } else {
        None
    }
}

pub(crate) fn parse_price(source_id: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| crate::error::Error::fetch(source_id, format!("invalid price {:?}: {}", raw, e)))
}

pub(crate) fn http_client(source_id: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("currency-explorer/0.1")
        .build()
        .map_err(|e| crate::error::Error::ConfigError(format!("{} http client: {}", source_id, e)))
}
