use chrono::{FixedOffset, Offset, Utc};
use std::time::Duration;

/// Settings for the BioTime HTTP client
#[derive(Debug, Clone)]
pub struct DeviceClientConfig {
    /// Per-request timeout covering connect and body
    pub request_timeout: Duration,
    pub page_size: u32,
    /// Upper bound on `next` links followed in one fetch
    pub max_pages: u32,
    /// Offset of the device clock. Naive punch times are read in this offset.
    pub utc_offset: FixedOffset,
}

impl Default for DeviceClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            page_size: 500,
            max_pages: 50,
            utc_offset: Utc.fix(),
        }
    }
}
