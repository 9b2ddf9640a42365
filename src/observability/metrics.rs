use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use crate::error::{Error, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Source metrics
    pub static ref SOURCE_FETCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("source_fetches_total", "Total number of fetch cycles per source"),
        &["source"]
    ).unwrap();

    pub static ref SOURCE_FETCH_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("source_fetch_failures_total", "Total number of failed fetch cycles per source"),
        &["source"]
    ).unwrap();

    pub static ref ACTIVE_UPDATERS: IntGauge = IntGauge::new(
        "active_updaters",
        "Number of running continuous-update tasks"
    ).unwrap();

    // Storage metrics
    pub static ref RECORDS_STORED: IntCounter = IntCounter::new(
        "records_stored_total",
        "Total number of rate records written to storage"
    ).unwrap();

    pub static ref RECORDS_EXPIRED: IntCounter = IntCounter::new(
        "records_expired_total",
        "Total number of rate records removed by the TTL sweep"
    ).unwrap();

    // Reader metrics
    pub static ref REFRESH_ON_MISS: IntCounter = IntCounter::new(
        "refresh_on_miss_total",
        "Total number of refreshes triggered by insufficient reads"
    ).unwrap();
}

pub fn register_metrics() -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SOURCE_FETCHES.clone()),
        Box::new(SOURCE_FETCH_FAILURES.clone()),
        Box::new(ACTIVE_UPDATERS.clone()),
        Box::new(RECORDS_STORED.clone()),
        Box::new(RECORDS_EXPIRED.clone()),
        Box::new(REFRESH_ON_MISS.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(Error::ConfigError(format!("metrics registration failed: {}", e))),
        }
    }
    Ok(())
}

/// Holds a gauge incremented for as long as it lives, including when the
/// owning task is aborted.
pub struct GaugeGuard {
    gauge: IntGauge,
}

impl GaugeGuard {
    pub fn new(gauge: &IntGauge) -> Self {
        gauge.inc();
        GaugeGuard { gauge: gauge.clone() }
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Render the registry in the Prometheus text format.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::ConfigError(format!("metrics encoding failed: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::ConfigError(e.to_string()))
}
