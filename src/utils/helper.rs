use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since epoch
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Convert a config value in seconds into a `Duration`, treating negative
/// and non-finite values as zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Clamp a requested interval (in seconds) into `[min, max]`, falling back
/// to `default` when nothing was requested.
pub fn clamp_secs(requested: Option<f64>, default: f64, min: f64, max: f64) -> Duration {
    let value = requested.filter(|v| v.is_finite()).unwrap_or(default);
    secs_to_duration(value.max(min).min(max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_to_duration() {
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
        assert_eq!(secs_to_duration(-3.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_clamp_secs() {
        assert_eq!(clamp_secs(None, 1.0, 0.1, 60.0), Duration::from_secs(1));
        assert_eq!(clamp_secs(Some(0.01), 1.0, 0.1, 60.0), Duration::from_millis(100));
        assert_eq!(clamp_secs(Some(600.0), 1.0, 0.1, 60.0), Duration::from_secs(60));
        assert_eq!(clamp_secs(Some(5.0), 1.0, 0.1, 60.0), Duration::from_secs(5));
    }
}
