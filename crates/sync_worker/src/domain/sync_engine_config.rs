use chrono::{FixedOffset, Offset, Utc};
use common::domain::DedupStrategy;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Hard deadline for one cycle, fetch included (default: 120 seconds)
    pub cycle_timeout_secs: u64,

    /// Whole days before today included in each fetch (default: 0)
    pub lookback_days: u32,

    /// Offset of the device clock, used to compute the local-day window
    pub device_utc_offset: FixedOffset,

    pub dedup_strategy: DedupStrategy,

    /// Records returned by a connection test (default: 5)
    pub preview_limit: usize,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            cycle_timeout_secs: 120,
            lookback_days: 0,
            device_utc_offset: Utc.fix(),
            dedup_strategy: DedupStrategy::default(),
            preview_limit: 5,
        }
    }
}

impl SyncEngineConfig {
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    /// Age past which a running state is treated as abandoned:
    /// `max(2 * poll_interval, cycle_timeout)`
    pub fn stale_after(&self, poll_interval_seconds: u32) -> chrono::Duration {
        let secs = (u64::from(poll_interval_seconds) * 2).max(self.cycle_timeout_secs);
        chrono::Duration::from_std(Duration::from_secs(secs))
            .unwrap_or_else(|_| chrono::Duration::days(365))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_after_uses_the_larger_bound() {
        let config = SyncEngineConfig::default();
        assert_eq!(config.stale_after(300), chrono::Duration::seconds(600));
        assert_eq!(config.stale_after(30), chrono::Duration::seconds(120));
    }
}
