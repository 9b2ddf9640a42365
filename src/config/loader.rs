use crate::config::*;
use crate::error::{Error, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const ENVIRONMENTS: &[&str] = &["DEV", "PROD", "TEST"];

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub debug: bool,
    pub json_logs: bool,
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub scraping: ScrapingConfig,
    pub websocket: WebSocketConfig,
    pub sources: SourcesConfig,
}

impl AppConfig {
    /// Layered load: `config/default`, `config/<env>`, then `CURRENCY_EXPLORER__*` variables.
    pub fn load(env: &str) -> Result<Self> {
        let env = env.to_uppercase();
        if !ENVIRONMENTS.contains(&env.as_str()) {
            return Err(Error::ConfigError(format!("{} config type not found", env)));
        }

        let config = Config::builder()
            .set_default("debug", env == "DEV")
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env.to_lowercase())).required(false))
            .add_source(
                Environment::with_prefix("CURRENCY_EXPLORER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let app_config: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn load_from_env() -> Result<Self> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "DEV".to_string());
        Self::load(&env)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.auth_token.trim().is_empty() {
            return Err(Error::ConfigError("api.auth_token must be set".to_string()));
        }

        let ws = &self.websocket;
        if ws.min_frequency <= 0.0 || ws.min_frequency > ws.max_frequency {
            return Err(Error::ConfigError(format!(
                "websocket frequency bounds invalid: min={}, max={}",
                ws.min_frequency, ws.max_frequency
            )));
        }

        for (name, venue) in [("binance", &self.sources.binance), ("kraken", &self.sources.kraken)] {
            for title in &venue.stream_pairs {
                crate::types::Pair::parse(title)
                    .map_err(|e| Error::ConfigError(format!("sources.{}.stream_pairs: {}", name, e)))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.api.auth_token = "secret".to_string();
        config
    }

    #[test]
    fn test_unknown_environment_rejected() {
        assert!(matches!(AppConfig::load("staging"), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_defaults() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.scraping.storage_lifetime(), None);
        assert_eq!(config.websocket.connection_time_limit(), Some(std::time::Duration::from_secs(3000)));
        assert!(config.sources.binance.enabled);
    }

    #[test]
    fn test_partial_venue_section_uses_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("api.auth_token", "secret").unwrap()
            .set_override("sources.kraken.enabled", false).unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.validate().is_ok());
        assert!(!config.sources.kraken.enabled);
        assert!(config.sources.kraken.auto_start);
        assert_eq!(config.sources.kraken.poll_interval, 1.0);
        assert_eq!(config.sources.kraken.base_url, None);
        assert!(config.sources.binance.enabled);

        let sources = crate::scrapers::build_sources(&config.sources).unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.source_id()).collect();
        assert_eq!(ids, vec!["binance"]);
    }

    #[test]
    fn test_missing_token_rejected() {
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn test_bad_stream_pair_rejected() {
        let mut config = valid_config();
        config.sources.binance.stream_pairs = vec!["BTCUSDT".to_string()];
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }
}
