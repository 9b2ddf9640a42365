use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::utils::helper::current_timestamp_ms;

/// Wall-clock capture time in milliseconds since epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(current_timestamp_ms())
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Unix time in (fractional) seconds.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0 as i64).single()
    }

    /// Elapsed time since this timestamp; zero if it lies in the future.
    pub fn age(&self) -> Duration {
        Timestamp::now() - *self
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(duration.as_millis() as u64))
    }
}

impl std::ops::Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, duration: Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(duration.as_millis() as u64))
    }
}

impl std::ops::Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_saturates_for_future() {
        let future = Timestamp::now() + Duration::from_secs(60);
        assert_eq!(future.age(), Duration::ZERO);
    }

    #[test]
    fn test_age_of_past_timestamp() {
        let past = Timestamp::now() - Duration::from_secs(5);
        assert!(past.age() >= Duration::from_secs(5));
    }

    #[test]
    fn test_to_datetime() {
        let ts = Timestamp::from_millis(1_712_448_799_890);
        assert_eq!(ts.to_datetime().unwrap().timestamp(), 1_712_448_799);
        assert_eq!(ts.as_secs_f64(), 1_712_448_799.89);
    }
}
