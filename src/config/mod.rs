use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::utils::helper::secs_to_duration;

pub mod loader;

pub use loader::AppConfig;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Secret bearer token required by every endpoint
    pub auth_token: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Seconds to wait after starting updaters before checking their status
    pub wait_workers_timeout: f64,
    /// Seconds to wait for updaters to drain after the stop signal
    pub stop_workers_timeout: f64,
    /// Record lifetime in seconds; absent disables expiry
    pub storage_lifetime: Option<f64>,
}

impl ScrapingConfig {
    pub fn wait_workers_timeout(&self) -> Duration {
        secs_to_duration(self.wait_workers_timeout)
    }

    pub fn stop_workers_timeout(&self) -> Duration {
        secs_to_duration(self.stop_workers_timeout)
    }

    pub fn storage_lifetime(&self) -> Option<Duration> {
        self.storage_lifetime.map(secs_to_duration)
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        ScrapingConfig {
            wait_workers_timeout: 2.0,
            stop_workers_timeout: 2.0,
            storage_lifetime: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub default_frequency: f64,
    pub min_frequency: f64,
    pub max_frequency: f64,
    /// Maximum connection time in seconds; 0 disables the limit
    pub connection_time_limit: u64,
}

impl WebSocketConfig {
    pub fn connection_time_limit(&self) -> Option<Duration> {
        match self.connection_time_limit {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            default_frequency: 1.0,
            min_frequency: 0.1,
            max_frequency: 60.0,
            connection_time_limit: 3000,  // 50 min
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct VenueConfig {
    pub enabled: bool,
    pub auto_start: bool,
    /// Seconds between polls of the default listener
    pub poll_interval: f64,
    /// Per-request timeout in seconds
    pub request_timeout: f64,
    /// Venue REST endpoint; absent means the venue's public API
    pub base_url: Option<String>,
    pub stream_url: Option<String>,
    /// Canonical pairs to subscribe to; non-empty switches to push mode
    pub stream_pairs: Vec<String>,
}

impl VenueConfig {
    pub fn poll_interval(&self) -> Duration {
        secs_to_duration(self.poll_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        secs_to_duration(self.request_timeout)
    }

    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url.as_deref().unwrap_or(default).trim_end_matches('/').to_string()
    }

    pub fn stream_url_or(&self, default: &str) -> String {
        self.stream_url.as_deref().unwrap_or(default).trim_end_matches('/').to_string()
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        VenueConfig {
            enabled: true,
            auto_start: true,
            poll_interval: 1.0,
            request_timeout: 10.0,
            base_url: None,
            stream_url: None,
            stream_pairs: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub binance: VenueConfig,
    pub kraken: VenueConfig,
}
