//! Daily reboot policy
//!
//! The pod reboots itself once a day at a configured UTC hour. The uptime
//! guard keeps a device that comes back up near the target hour from
//! reboot-looping until the hour rolls over.

use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};

use super::errors::DomainError;

/// Minimum uptime before a scheduled reboot may fire
pub const MIN_UPTIME: Duration = Duration::from_secs(3600);

/// When the daily maintenance reboot is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootPolicy {
    hour_utc: u32,
}

impl RebootPolicy {
    /// Creates a policy for the given UTC hour (0..=23).
    pub fn new(hour_utc: u32) -> Result<Self, DomainError> {
        if hour_utc > 23 {
            return Err(DomainError::InvalidRebootHour(hour_utc));
        }
        Ok(Self { hour_utc })
    }

    /// The configured reboot hour (UTC)
    #[must_use]
    pub fn hour_utc(&self) -> u32 {
        self.hour_utc
    }

    /// True iff uptime exceeds [`MIN_UPTIME`] and `now` falls in the
    /// configured hour.
    #[must_use]
    pub fn is_due(&self, uptime: Duration, now: DateTime<Utc>) -> bool {
        uptime > MIN_UPTIME && now.hour() == self.hour_utc
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 15, 0).unwrap()
    }

    #[test]
    fn rejects_invalid_hour() {
        assert!(RebootPolicy::new(24).is_err());
        assert!(RebootPolicy::new(2).is_ok());
    }

    #[test]
    fn due_when_uptime_exceeded_and_hour_matches() {
        let policy = RebootPolicy::new(2).unwrap();
        assert!(policy.is_due(Duration::from_secs(3601), at_hour(2)));
    }

    #[test]
    fn not_due_at_exactly_one_hour_uptime() {
        let policy = RebootPolicy::new(2).unwrap();
        assert!(!policy.is_due(Duration::from_secs(3600), at_hour(2)));
    }

    #[test]
    fn not_due_with_low_uptime_at_any_hour() {
        let policy = RebootPolicy::new(2).unwrap();
        for hour in 0..24 {
            assert!(!policy.is_due(Duration::from_secs(60), at_hour(hour)));
        }
    }

    #[test]
    fn not_due_outside_configured_hour() {
        let policy = RebootPolicy::new(2).unwrap();
        assert!(!policy.is_due(Duration::from_secs(7200), at_hour(3)));
        assert!(!policy.is_due(Duration::from_secs(7200), at_hour(1)));
    }
}
