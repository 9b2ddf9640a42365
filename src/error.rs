use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Input Validation Errors
    #[error("Invalid pair format: {0}")]
    InvalidPairFormat(String),

    // Source Errors
    #[error("Fetch from {source_id} failed: {reason}")]
    FetchError {
        source_id: String,
        reason: String,
    },

    #[error("Invalid result from scraper {source_id}: {reason}")]
    InvalidScraperResult {
        source_id: String,
        reason: String,
    },

    // Registry Errors
    #[error("{0} already exists in scraping manager flow")]
    NameConflict(String),

    #[error("passed exchange name ({0}) not found in a system")]
    UnknownSource(String),

    #[error("Source id must not be empty")]
    EmptySourceId,

    // Lifecycle Errors
    #[error("Failed to start scrapers: ({})", .0.join(","))]
    StartupHealthCheckFailure(Vec<String>),

    // System Errors
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    pub fn fetch(source_id: &str, reason: impl ToString) -> Self {
        Error::FetchError {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_result(source_id: &str, reason: impl ToString) -> Self {
        Error::InvalidScraperResult {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors caused by the caller's input rather than the service itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidPairFormat(_) | Error::UnknownSource(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_failure_lists_sources() {
        let err = Error::StartupHealthCheckFailure(vec!["binance".into(), "kraken".into()]);
        assert_eq!(err.to_string(), "Failed to start scrapers: (binance,kraken)");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::InvalidPairFormat("x".into()).is_client_error());
        assert!(Error::UnknownSource("x".into()).is_client_error());
        assert!(!Error::fetch("binance", "timeout").is_client_error());
        assert!(!Error::NameConflict("binance".into()).is_client_error());
    }
}
